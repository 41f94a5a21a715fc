//! Embedding providers
//!
//! The primary embedder is an OpenAI-compatible HTTP endpoint producing
//! 768-component vectors. The local fallback is a feature-hashed
//! bag-of-words embedder: crude, but always available and good enough to
//! rerank keyword hits when no API key is configured.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::config::LOCAL_EMBEDDING_DIM;

#[cfg(feature = "openai")]
use async_trait::async_trait;

#[cfg(feature = "openai")]
use super::EmbeddingProvider;
#[cfg(feature = "openai")]
use crate::config::{EMBEDDING_DIM, EMBED_BATCH_CAP};
#[cfg(feature = "openai")]
use crate::error::{CortexError, Result};

/// Environment variable holding the embedding API key
pub const EMBED_API_KEY_ENV: &str = "CORTEX_EMBED_API_KEY";

/// Environment variable overriding the embedding endpoint
pub const EMBED_BASE_URL_ENV: &str = "CORTEX_EMBED_BASE_URL";

/// OpenAI-compatible embedding client
#[cfg(feature = "openai")]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[cfg(feature = "openai")]
impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var(EMBED_BASE_URL_ENV)
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model: "text-embedding-3-small".to_string(),
        }
    }
}

#[cfg(feature = "openai")]
#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.len() > EMBED_BATCH_CAP {
            return Err(CortexError::InvalidInput(format!(
                "embedding batch of {} exceeds cap of {}",
                texts.len(),
                EMBED_BATCH_CAP
            )));
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "input": texts,
                "model": self.model,
                "dimensions": EMBEDDING_DIM,
            }))
            .send()
            .await
            .map_err(|e| CortexError::ProviderFailed(format!("embedding request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CortexError::ProviderFailed(format!(
                "embedding API error {}: {}",
                status, body
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CortexError::ParseFailed(format!("embedding response: {}", e)))?;

        let vectors: Vec<Vec<f64>> = data["data"]
            .as_array()
            .ok_or_else(|| CortexError::ParseFailed("missing data array".to_string()))?
            .iter()
            .map(|item| {
                item["embedding"]
                    .as_array()
                    .map(|arr| arr.iter().filter_map(|v| v.as_f64()).collect())
                    .unwrap_or_default()
            })
            .collect();

        if vectors.len() != texts.len() {
            return Err(CortexError::ParseFailed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

/// Build the primary embedder from the environment, if configured
#[cfg(feature = "openai")]
pub fn create_primary_embedder() -> Option<Box<dyn EmbeddingProvider>> {
    let api_key = std::env::var(EMBED_API_KEY_ENV).ok()?;
    if api_key.is_empty() {
        return None;
    }
    Some(Box::new(OpenAiEmbedder::new(api_key)))
}

#[cfg(not(feature = "openai"))]
pub fn create_primary_embedder() -> Option<Box<dyn super::EmbeddingProvider>> {
    None
}

/// Feature-hashed bag-of-words embedder, the always-available fallback.
/// Produces L2-normalized 384-component f32 vectors.
pub struct LocalEmbedder {
    dimensions: usize,
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self {
            dimensions: LOCAL_EMBEDDING_DIM,
        }
    }
}

impl LocalEmbedder {
    fn hash_to_index(token: &str, dimensions: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % dimensions
    }

    fn hash_to_sign(token: &str) -> f32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        b'~'.hash(&mut hasher);
        if hasher.finish() & 1 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a single text. Empty text yields the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];

        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect();
        if tokens.is_empty() {
            return vector;
        }

        let mut counts: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let total = tokens.len() as f32;
        for (token, count) in counts {
            // Sub-linear term weighting so repeated words don't dominate
            let weight = (1.0 + count / total).ln();
            let index = Self::hash_to_index(token, self.dimensions);
            vector[index] += weight * Self::hash_to_sign(token);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for component in &mut vector {
                *component /= norm;
            }
        }
        vector
    }
}
