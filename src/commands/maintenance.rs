//! Maintenance commands: lifecycle, embedding backfill, AI-driven
//! pruning, consolidation review, and stats

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{self, EMBED_BATCH_CAP};
use crate::context::MemoryContext;
use crate::error::{CortexError, Result};
use crate::lifecycle::{self, LifecycleOutcome};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::similarity::{jaccard_text, CONSOLIDATE_THRESHOLD};
use crate::storage::queries;
use crate::telemetry::Telemetry;
use crate::types::{Memory, MemoryPatch, MemoryStatus, Scope};

/// Run the lifecycle over both stores and record the run
pub fn run_lifecycle(ctx: &MemoryContext) -> Result<LifecycleOutcome> {
    let telemetry_path = config::telemetry_path(&ctx.cwd);
    let mut telemetry = Telemetry::load(&telemetry_path);

    let outcome = lifecycle::run(ctx, Utc::now())?;
    telemetry.last_lifecycle_at = Some(Utc::now());
    if let Err(e) = telemetry.save(&telemetry_path) {
        warn!("telemetry save failed: {}", e);
    }
    Ok(outcome)
}

/// Result of an embedding backfill pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillResult {
    pub embedded: usize,
    pub remaining_unavailable: bool,
}

/// Embed memories whose primary vector is missing, in provider-capped
/// batches, writing vectors back as they arrive. Raw code is excluded at
/// the query level and never embedded.
pub async fn backfill(
    ctx: &MemoryContext,
    embedder: Option<&dyn EmbeddingProvider>,
) -> Result<BackfillResult> {
    let Some(provider) = embedder.filter(|p| p.available()) else {
        info!("embedding provider unavailable, backfill skipped");
        return Ok(BackfillResult {
            embedded: 0,
            remaining_unavailable: true,
        });
    };

    let mut embedded = 0;
    for (_, store) in ctx.stores() {
        loop {
            let batch = store.with_connection(|conn| {
                queries::get_memories_missing_embedding(conn, EMBED_BATCH_CAP)
            })?;
            if batch.is_empty() {
                break;
            }

            let texts: Vec<String> = batch.iter().map(|m| m.content.clone()).collect();
            let vectors = provider.embed_batch(&texts).await?;

            for (memory, vector) in batch.iter().zip(vectors) {
                if vector.is_empty() {
                    continue;
                }
                store.with_connection(|conn| {
                    queries::update_memory(
                        conn,
                        &memory.id,
                        &MemoryPatch {
                            embedding: Some(vector.clone()),
                            ..Default::default()
                        },
                    )
                })?;
                embedded += 1;
            }
        }
    }

    Ok(BackfillResult {
        embedded,
        remaining_unavailable: false,
    })
}

/// Result of an AI prune pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct AiPruneResult {
    pub judged: usize,
    pub archived: usize,
    pub skipped_pinned: usize,
}

fn build_prune_prompt(memories: &[Memory]) -> String {
    let mut prompt = String::from(
        "Review these project memories and list the ids that are obsolete, \
         superseded by later knowledge, or no longer useful. Respond with a \
         JSON array of id strings only.\n\n",
    );
    for memory in memories {
        prompt.push_str(&format!(
            "- id={} type={} confidence={:.2} accessed={} summary={}\n",
            memory.id,
            memory.memory_type.as_str(),
            memory.confidence,
            memory.access_count,
            memory.summary.replace('\n', " ")
        ));
    }
    prompt
}

fn parse_id_array(response: &str) -> Result<Vec<String>> {
    let trimmed = response.trim();
    if let Ok(ids) = serde_json::from_str::<Vec<String>>(trimmed) {
        return Ok(ids);
    }
    let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) else {
        return Err(CortexError::ParseFailed(
            "no id array in judge response".to_string(),
        ));
    };
    serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| CortexError::ParseFailed(format!("id array: {}", e)))
}

/// Ask the judge which active memories to archive. Pinned memories are
/// never archived regardless of the judge's answer.
pub async fn ai_prune(ctx: &MemoryContext, judge: &dyn LlmProvider) -> Result<AiPruneResult> {
    if !judge.available() {
        return Err(CortexError::ProviderUnavailable(
            "prune judge unavailable".to_string(),
        ));
    }

    let mut result = AiPruneResult::default();
    for (_, store) in ctx.stores() {
        let active = store.with_connection(queries::get_active_memories)?;
        if active.is_empty() {
            continue;
        }
        result.judged += active.len();

        let response = judge.complete(&build_prune_prompt(&active)).await?;
        let ids = parse_id_array(&response)?;

        for id in ids {
            let Some(memory) = active.iter().find(|m| m.id == id) else {
                continue;
            };
            if memory.pinned {
                info!(id = %memory.id, "judge suggested pinned memory, refusing");
                result.skipped_pinned += 1;
                continue;
            }
            store.with_connection(|conn| {
                queries::update_memory(
                    conn,
                    &id,
                    &MemoryPatch {
                        status: Some(MemoryStatus::Archived),
                        ..Default::default()
                    },
                )
            })?;
            result.archived += 1;
        }
    }

    let telemetry_path = config::telemetry_path(&ctx.cwd);
    let mut telemetry = Telemetry::load(&telemetry_path);
    telemetry.last_ai_prune_at = Some(Utc::now());
    telemetry.sessions_since_ai_prune = 0;
    if let Err(e) = telemetry.save(&telemetry_path) {
        warn!("telemetry save failed: {}", e);
    }

    Ok(result)
}

/// A pair of active memories similar enough to merge, surfaced for
/// external review. Merging is out of scope for the automated pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationCandidate {
    pub first_id: String,
    pub second_id: String,
    pub scope: Scope,
    pub similarity: f64,
}

/// Find consolidation candidates per store by pairwise Jaccard
pub fn consolidate_candidates(ctx: &MemoryContext) -> Result<Vec<ConsolidationCandidate>> {
    let mut candidates = Vec::new();
    for (scope, store) in ctx.stores() {
        let active = store.with_connection(queries::get_active_memories)?;
        for (index, first) in active.iter().enumerate() {
            for second in &active[index + 1..] {
                let similarity = jaccard_text(&first.content, &second.content);
                if similarity >= CONSOLIDATE_THRESHOLD {
                    candidates.push(ConsolidationCandidate {
                        first_id: first.id.clone(),
                        second_id: second.id.clone(),
                        scope,
                        similarity,
                    });
                }
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(candidates)
}

/// Store counts for the stats command
#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub project: StoreStats,
    pub global: StoreStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub by_status: Vec<(String, i64)>,
    pub by_type: Vec<(String, i64)>,
}

/// Count memories by status and type in both stores
pub fn stats(ctx: &MemoryContext) -> Result<StatsResult> {
    let collect = |store: &crate::storage::Store| -> Result<StoreStats> {
        store.with_connection(|conn| {
            Ok(StoreStats {
                by_status: queries::count_memories_by_status(conn)?,
                by_type: queries::count_memories_by_type(conn)?,
            })
        })
    };
    Ok(StatsResult {
        project: collect(&ctx.project)?,
        global: collect(&ctx.global)?,
    })
}
