//! Recall: keyword search with optional semantic rerank and graph
//! enrichment

use serde::Serialize;
use tracing::debug;

use crate::config::{DEFAULT_SEARCH_LIMIT, DEFAULT_TRAVERSAL_DEPTH};
use crate::context::MemoryContext;
use crate::error::{CortexError, Result};
use crate::graph::{traverse, TraversalDirection, TraversalNode, TraversalOptions};
use crate::providers::{EmbeddingProvider, LocalEmbedder};
use crate::similarity::cosine;
use crate::storage::queries;
use crate::types::{Memory, RelationType, Scope};

/// Parsed recall arguments: positional `<cwd> <query>` plus options
#[derive(Debug, Clone, PartialEq)]
pub struct RecallArgs {
    pub cwd: String,
    pub query: String,
    pub branch: Option<String>,
    pub limit: usize,
    pub keyword_only: bool,
}

/// Parse the recall argument grammar. Unknown options are rejected;
/// non-positive or unparsable `--limit` values revert to the default.
pub fn parse_recall_args(args: &[String]) -> Result<RecallArgs> {
    let mut positional = Vec::new();
    let mut branch = None;
    let mut limit = DEFAULT_SEARCH_LIMIT;
    let mut keyword_only = false;

    for arg in args {
        if let Some(value) = arg.strip_prefix("--branch=") {
            branch = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--limit=") {
            limit = match value.parse::<i64>() {
                Ok(n) if n > 0 => n as usize,
                _ => DEFAULT_SEARCH_LIMIT,
            };
        } else if arg == "--keyword" {
            keyword_only = true;
        } else if arg.starts_with("--") {
            return Err(CortexError::InvalidInput(format!("unknown option {}", arg)));
        } else {
            positional.push(arg.clone());
        }
    }

    if positional.len() < 2 {
        return Err(CortexError::InvalidInput(
            "usage: recall <cwd> <query> [--branch=...] [--limit=N] [--keyword]".to_string(),
        ));
    }

    let cwd = positional.remove(0);
    let query = positional.join(" ");
    Ok(RecallArgs {
        cwd,
        query,
        branch,
        limit,
        keyword_only,
    })
}

/// One recalled memory with its relevance score and optional enrichment
#[derive(Debug, Clone, Serialize)]
pub struct RecallResult {
    pub memory: Memory,
    pub scope: Scope,
    pub score: f64,
    /// Neighbors within two hops, when enrichment is on
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<TraversalNode>,
    /// Raw code linked from a code description via source_of
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub linked_code: Vec<Memory>,
}

/// Options beyond the parsed CLI grammar
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    /// Attach depth-2 neighbors and linked code to each result
    pub enrich: bool,
}

/// Run recall over both stores: keyword search, optional cosine rerank
/// when embeddings are available, project-first merge deduplicated by id.
/// Every returned memory has its access recorded.
pub async fn recall(
    ctx: &MemoryContext,
    args: &RecallArgs,
    embedder: Option<&dyn EmbeddingProvider>,
    options: &RecallOptions,
) -> Result<Vec<RecallResult>> {
    let mut merged: Vec<(Scope, Memory)> = Vec::new();
    for (scope, store) in ctx.stores() {
        let hits = store
            .with_connection(|conn| queries::search_by_keyword(conn, &args.query, args.limit))?;
        for memory in hits {
            if merged.iter().any(|(_, m)| m.id == memory.id) {
                continue;
            }
            merged.push((scope, memory));
        }
    }

    // Keyword order carries a mild positional score so unembedded
    // memories still rank sensibly after the semantic rerank.
    let mut scored: Vec<(Scope, Memory, f64)> = merged
        .into_iter()
        .enumerate()
        .map(|(position, (scope, memory))| {
            let keyword_score = 1.0 / (1.0 + position as f64);
            (scope, memory, keyword_score)
        })
        .collect();

    if !args.keyword_only {
        if let Some(query_vector) = embed_query(&args.query, embedder).await {
            for (_, memory, score) in &mut scored {
                if let Some(similarity) = semantic_score(memory, &query_vector) {
                    *score = similarity;
                }
            }
        }
    }

    if let Some(branch) = &args.branch {
        for (_, memory, score) in &mut scored {
            if memory.source_branch().as_deref() == Some(branch.as_str()) {
                *score += 0.1;
            }
        }
    }

    scored.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });
    scored.truncate(args.limit);

    let mut results = Vec::with_capacity(scored.len());
    for (scope, memory, score) in scored {
        let store = ctx.store_for(scope);
        store.with_connection(|conn| queries::record_access(conn, &memory.id))?;

        let (related, linked_code) = if options.enrich {
            enrich(ctx, scope, &memory)?
        } else {
            (Vec::new(), Vec::new())
        };

        results.push(RecallResult {
            memory,
            scope,
            score,
            related,
            linked_code,
        });
    }
    Ok(results)
}

/// The query vector used for the rerank: primary when the provider is
/// available, local fallback otherwise.
async fn embed_query(
    query: &str,
    embedder: Option<&dyn EmbeddingProvider>,
) -> Option<QueryVector> {
    if let Some(provider) = embedder {
        if provider.available() {
            match provider.embed_batch(&[query.to_string()]).await {
                Ok(mut vectors) if !vectors.is_empty() => {
                    return Some(QueryVector::Primary(vectors.remove(0)));
                }
                Ok(_) => {}
                Err(e) => debug!("query embedding failed, falling back: {}", e),
            }
        }
    }
    Some(QueryVector::Local(LocalEmbedder::default().embed(query)))
}

enum QueryVector {
    Primary(Vec<f64>),
    Local(Vec<f32>),
}

/// Cosine against the matching embedding kind only
fn semantic_score(memory: &Memory, query: &QueryVector) -> Option<f64> {
    match query {
        QueryVector::Primary(vector) => {
            memory.embedding.as_ref().map(|m| cosine(m, vector))
        }
        QueryVector::Local(vector) => memory
            .local_embedding
            .as_ref()
            .map(|m| cosine(m, vector)),
    }
}

fn enrich(
    ctx: &MemoryContext,
    scope: Scope,
    memory: &Memory,
) -> Result<(Vec<TraversalNode>, Vec<Memory>)> {
    let store = ctx.store_for(scope);
    let edges = store.with_connection(queries::get_all_edges)?;

    let related = traverse(
        &memory.id,
        &edges,
        &TraversalOptions {
            max_depth: DEFAULT_TRAVERSAL_DEPTH,
            direction: TraversalDirection::Both,
            ..Default::default()
        },
    );

    let mut linked_code = Vec::new();
    let outgoing = store.with_connection(|conn| queries::get_edges_from(conn, &memory.id))?;
    for edge in outgoing {
        if edge.relation_type != RelationType::SourceOf {
            continue;
        }
        if let Ok(code) = store.with_connection(|conn| queries::get_memory(conn, &edge.target_id))
        {
            linked_code.push(code);
        }
    }

    Ok((related, linked_code))
}
