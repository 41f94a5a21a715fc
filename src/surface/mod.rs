//! Ranking and surface selection
//!
//! Scores every candidate memory with a composite rank, then fills
//! per-category line budgets in rank order, redistributing unused budget
//! to the overflow. Selection is deterministic for identical inputs.

pub mod render;

use std::collections::HashMap;

use crate::graph::compute_centrality;
use crate::types::{Edge, Memory, MemoryType};

/// Per-category line budgets for the surface
pub fn line_budget(memory_type: MemoryType) -> usize {
    match memory_type {
        MemoryType::Architecture => 25,
        MemoryType::Decision => 25,
        MemoryType::Pattern => 25,
        MemoryType::Gotcha => 20,
        MemoryType::Progress => 30,
        MemoryType::Context => 15,
        MemoryType::CodeDescription => 10,
        MemoryType::Code => 0,
    }
}

/// Category order for selection and rendering
pub const CATEGORY_ORDER: [MemoryType; 8] = [
    MemoryType::Architecture,
    MemoryType::Decision,
    MemoryType::Pattern,
    MemoryType::Gotcha,
    MemoryType::Progress,
    MemoryType::Context,
    MemoryType::CodeDescription,
    MemoryType::Code,
];

/// A memory with its attached centrality and composite rank
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub memory: Memory,
    pub centrality: f64,
    pub rank: f64,
}

impl RankedMemory {
    /// Summary lines this memory occupies on the surface
    pub fn line_count(&self) -> usize {
        self.memory.summary.split('\n').count()
    }
}

/// Composite rank, clamped to [0, 1]:
/// 0.50 confidence + 0.20 priority + 0.15 centrality + 0.15 access share,
/// plus 0.1 when the memory's source branch matches the current branch.
pub fn compute_rank(
    memory: &Memory,
    centrality: f64,
    max_access_log: f64,
    current_branch: Option<&str>,
) -> f64 {
    let access_share = (memory.access_count as f64 + 1.0).ln() / max_access_log;

    let branch_boost = match (current_branch, memory.source_branch()) {
        (Some(current), Some(source)) if current == source => 0.1,
        _ => 0.0,
    };

    let rank = 0.50 * memory.confidence
        + 0.20 * (memory.priority as f64 / 10.0)
        + 0.15 * centrality
        + 0.15 * access_share
        + branch_boost;

    rank.clamp(0.0, 1.0)
}

/// Attach centrality and rank to every candidate
pub fn rank_memories(
    memories: Vec<Memory>,
    edges: &[Edge],
    current_branch: Option<&str>,
) -> Vec<RankedMemory> {
    let centrality_map = compute_centrality(edges);

    let max_access_log = memories
        .iter()
        .map(|m| (m.access_count as f64 + 1.0).ln())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    memories
        .into_iter()
        .map(|memory| {
            let centrality = centrality_map.get(&memory.id).copied().unwrap_or(0.0);
            let rank = compute_rank(&memory, centrality, max_access_log, current_branch);
            RankedMemory {
                memory,
                centrality,
                rank,
            }
        })
        .collect()
}

fn by_rank_then_id(a: &RankedMemory, b: &RankedMemory) -> std::cmp::Ordering {
    b.rank
        .partial_cmp(&a.rank)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.memory.id.cmp(&b.memory.id))
}

/// Select the memories that fit the surface. Two passes: fill each
/// category up to its budget in rank order, then spend the pooled unused
/// budget on the rank-sorted overflow.
pub fn select_for_surface(
    memories: Vec<Memory>,
    edges: &[Edge],
    current_branch: Option<&str>,
) -> Vec<RankedMemory> {
    let ranked = rank_memories(memories, edges, current_branch);

    let mut groups: HashMap<MemoryType, Vec<RankedMemory>> = HashMap::new();
    for candidate in ranked {
        groups
            .entry(candidate.memory.memory_type)
            .or_default()
            .push(candidate);
    }

    let mut selected: Vec<RankedMemory> = Vec::new();
    let mut overflow: Vec<RankedMemory> = Vec::new();
    let mut used_lines = 0usize;

    for memory_type in CATEGORY_ORDER {
        let Some(mut group) = groups.remove(&memory_type) else {
            continue;
        };
        group.sort_by(by_rank_then_id);

        let budget = line_budget(memory_type);
        let mut used = 0usize;
        for candidate in group {
            let lines = candidate.line_count();
            if used + lines <= budget {
                used += lines;
                selected.push(candidate);
            } else {
                overflow.push(candidate);
            }
        }
        used_lines += used;
    }

    // Unused budget across all categories, including empty ones
    let total_budget: usize = CATEGORY_ORDER.iter().map(|t| line_budget(*t)).sum();
    let mut remaining = total_budget.saturating_sub(used_lines);

    overflow.sort_by(by_rank_then_id);
    for candidate in overflow {
        let lines = candidate.line_count();
        if lines <= remaining {
            remaining -= lines;
            selected.push(candidate);
        }
    }

    // Deterministic final order: category, then rank, then id
    selected.sort_by(|a, b| {
        let pos = |t: MemoryType| CATEGORY_ORDER.iter().position(|c| *c == t).unwrap_or(8);
        pos(a.memory.memory_type)
            .cmp(&pos(b.memory.memory_type))
            .then_with(|| by_rank_then_id(a, b))
    });

    selected
}
