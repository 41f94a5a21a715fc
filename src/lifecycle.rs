//! Lifecycle driver
//!
//! Applies decay and status transitions to every active and archived
//! memory. Writes are individual updates; no transaction spans a pass, so
//! a crash mid-run leaves a prefix applied and the next run picks up the
//! rest. Decayed confidence is computed from `created_at` on every pass
//! and never written back, so decay cannot compound.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::LIFECYCLE_FALLBACK_HOURS;
use crate::context::MemoryContext;
use crate::decay::{decay_confidence, decide_action, LifecycleAction};
use crate::error::Result;
use crate::graph::compute_centrality;
use crate::storage::queries;
use crate::storage::Store;
use crate::telemetry::Telemetry;
use crate::types::MemoryStatus;

/// Counters from one lifecycle run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleOutcome {
    pub examined: usize,
    pub archived: usize,
    pub pruned: usize,
    pub exempted: usize,
}

impl LifecycleOutcome {
    fn merge(self, other: LifecycleOutcome) -> Self {
        Self {
            examined: self.examined + other.examined,
            archived: self.archived + other.archived,
            pruned: self.pruned + other.pruned,
            exempted: self.exempted + other.exempted,
        }
    }
}

/// Run the lifecycle over a single store. Idempotent: re-running at the
/// same clock makes no further changes.
pub fn run_store(store: &Store, now: DateTime<Utc>) -> Result<LifecycleOutcome> {
    let mut outcome = LifecycleOutcome::default();

    let (active, edges) = store.with_connection(|conn| {
        Ok((
            queries::get_active_memories(conn)?,
            queries::get_all_edges(conn)?,
        ))
    })?;
    let centrality = compute_centrality(&edges);

    for memory in &active {
        outcome.examined += 1;
        let node_centrality = centrality.get(&memory.id).copied().unwrap_or(0.0);
        let decayed = decay_confidence(memory, node_centrality, now);

        match decide_action(memory, decayed, node_centrality, now) {
            LifecycleAction::Archive => {
                let result = store.with_connection(|conn| {
                    queries::set_memory_status(conn, &memory.id, MemoryStatus::Archived, now)
                });
                match result {
                    Ok(_) => {
                        info!(id = %memory.id, decayed, "archived memory");
                        outcome.archived += 1;
                    }
                    Err(e) => warn!(id = %memory.id, "archive failed: {}", e),
                }
            }
            LifecycleAction::ExemptPinned | LifecycleAction::ExemptHighCentrality => {
                outcome.exempted += 1;
            }
            LifecycleAction::Prune | LifecycleAction::None => {}
        }
    }

    // Second pass over archived memories, including any archived above
    let archived = store.with_connection(queries::get_archived_memories)?;
    for memory in &archived {
        outcome.examined += 1;
        let node_centrality = centrality.get(&memory.id).copied().unwrap_or(0.0);
        let decayed = decay_confidence(memory, node_centrality, now);

        if decide_action(memory, decayed, node_centrality, now) == LifecycleAction::Prune {
            let result = store.with_connection(|conn| {
                queries::set_memory_status(conn, &memory.id, MemoryStatus::Pruned, now)
            });
            match result {
                Ok(_) => {
                    info!(id = %memory.id, "pruned memory");
                    outcome.pruned += 1;
                }
                Err(e) => warn!(id = %memory.id, "prune failed: {}", e),
            }
        }
    }

    Ok(outcome)
}

/// Run the lifecycle over both stores
pub fn run(ctx: &MemoryContext, now: DateTime<Utc>) -> Result<LifecycleOutcome> {
    let mut outcome = LifecycleOutcome::default();
    for (_, store) in ctx.stores() {
        outcome = outcome.merge(run_store(store, now)?);
    }
    Ok(outcome)
}

/// Smart trigger: run when no run is recorded, when memories are newer
/// than the last run, or when the fallback interval has elapsed. Stamps
/// `last_lifecycle_at` in the telemetry on a run; the caller persists it.
pub fn run_if_needed(
    ctx: &MemoryContext,
    telemetry: &mut Telemetry,
    now: DateTime<Utc>,
) -> Result<Option<LifecycleOutcome>> {
    let due = match telemetry.last_lifecycle_at {
        None => true,
        Some(last) => {
            let newest = ctx
                .stores()
                .iter()
                .filter_map(|(_, store)| {
                    store
                        .with_connection(queries::get_latest_memory_timestamp)
                        .ok()
                        .flatten()
                })
                .max();
            newest.is_some_and(|ts| ts > last)
                || now - last >= Duration::hours(LIFECYCLE_FALLBACK_HOURS)
        }
    };

    if !due {
        debug!("lifecycle not due, skipping");
        return Ok(None);
    }

    let outcome = run(ctx, now)?;
    telemetry.last_lifecycle_at = Some(now);
    Ok(Some(outcome))
}
