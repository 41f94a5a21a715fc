//! Graph engine: centrality and filtered traversal
//!
//! Edges can form cycles; traversal carries a visited set keyed by memory
//! id and never stores back-references inside memory values.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{Edge, MemoryId, RelationType};

/// Normalize a user-supplied edge-type name. Accepts canonical names and
/// documented aliases, case- and whitespace-insensitive; `None` on unknown
/// input.
pub fn sanitize_edge_type(raw: &str) -> Option<RelationType> {
    match raw.trim().to_lowercase().as_str() {
        "relates_to" | "related" => Some(RelationType::RelatesTo),
        "derived_from" | "derives" => Some(RelationType::DerivedFrom),
        "contradicts" | "contradict" => Some(RelationType::Contradicts),
        "exemplifies" | "example" => Some(RelationType::Exemplifies),
        "refines" | "refine" => Some(RelationType::Refines),
        "supersedes" | "supersede" => Some(RelationType::Supersedes),
        "source_of" | "source" => Some(RelationType::SourceOf),
        _ => None,
    }
}

/// In-degree centrality: each memory's incoming-edge count normalized by
/// the maximum observed, so the top node scores 1.0. Only memories that
/// appear as targets are present in the map.
pub fn compute_centrality(edges: &[Edge]) -> HashMap<MemoryId, f64> {
    let mut in_degree: HashMap<MemoryId, usize> = HashMap::new();
    for edge in edges {
        *in_degree.entry(edge.target_id.clone()).or_insert(0) += 1;
    }

    let max = in_degree.values().copied().max().unwrap_or(0);
    if max == 0 {
        return HashMap::new();
    }

    in_degree
        .into_iter()
        .map(|(id, count)| (id, count as f64 / max as f64))
        .collect()
}

/// Traversal direction relative to edge orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

impl std::str::FromStr for TraversalDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "outgoing" => Ok(TraversalDirection::Outgoing),
            "incoming" => Ok(TraversalDirection::Incoming),
            "both" => Ok(TraversalDirection::Both),
            _ => Err(format!("Unknown traversal direction: {}", s)),
        }
    }
}

/// Options for filtered BFS
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Maximum hop count; zero yields no results
    pub max_depth: usize,
    /// Restrict to these relation types (empty means all)
    pub edge_types: Vec<RelationType>,
    pub direction: TraversalDirection,
    /// Edges weaker than this are not walked
    pub min_strength: f64,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_depth: crate::config::DEFAULT_TRAVERSAL_DEPTH,
            edge_types: Vec::new(),
            direction: TraversalDirection::Outgoing,
            min_strength: 0.0,
        }
    }
}

/// A memory reached by traversal, with the edge path that led to it
#[derive(Debug, Clone, Serialize)]
pub struct TraversalNode {
    pub id: MemoryId,
    /// Hops from the start node (>= 1)
    pub depth: usize,
    /// Edges from the start node; length equals depth
    pub path: Vec<Edge>,
}

/// Filtered breadth-first traversal from a start node. Each reachable node
/// is emitted exactly once; the start node is never included.
pub fn traverse(
    start: &str,
    edges: &[Edge],
    options: &TraversalOptions,
) -> Vec<TraversalNode> {
    if options.max_depth == 0 {
        return Vec::new();
    }

    let admissible = |edge: &Edge| -> bool {
        if edge.strength < options.min_strength {
            return false;
        }
        options.edge_types.is_empty() || options.edge_types.contains(&edge.relation_type)
    };

    // Hops available from each node under the requested direction. For an
    // incoming walk, an edge X -> Y is an outbound hop for Y.
    let mut adjacency: HashMap<&str, Vec<(&Edge, &str)>> = HashMap::new();
    for edge in edges {
        if !admissible(edge) {
            continue;
        }
        match options.direction {
            TraversalDirection::Outgoing => {
                adjacency
                    .entry(edge.source_id.as_str())
                    .or_default()
                    .push((edge, edge.target_id.as_str()));
            }
            TraversalDirection::Incoming => {
                adjacency
                    .entry(edge.target_id.as_str())
                    .or_default()
                    .push((edge, edge.source_id.as_str()));
            }
            TraversalDirection::Both => {
                adjacency
                    .entry(edge.source_id.as_str())
                    .or_default()
                    .push((edge, edge.target_id.as_str()));
                adjacency
                    .entry(edge.target_id.as_str())
                    .or_default()
                    .push((edge, edge.source_id.as_str()));
            }
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(start);

    let mut results = Vec::new();
    let mut queue: VecDeque<(&str, usize, Vec<Edge>)> = VecDeque::new();
    queue.push_back((start, 0, Vec::new()));

    while let Some((node, depth, path)) = queue.pop_front() {
        if depth >= options.max_depth {
            continue;
        }
        let Some(hops) = adjacency.get(node) else {
            continue;
        };
        for (edge, next) in hops {
            if visited.contains(next) {
                continue;
            }
            visited.insert(next);

            let mut next_path = path.clone();
            next_path.push((*edge).clone());
            results.push(TraversalNode {
                id: next.to_string(),
                depth: depth + 1,
                path: next_path.clone(),
            });
            queue.push_back((next, depth + 1, next_path));
        }
    }

    results
}
