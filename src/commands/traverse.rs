//! Graph traversal command

use serde::Serialize;

use crate::context::MemoryContext;
use crate::error::{CortexError, Result};
use crate::graph::{
    sanitize_edge_type, traverse as graph_traverse, TraversalDirection, TraversalNode,
    TraversalOptions,
};
use crate::storage::queries;
use crate::types::RelationType;

/// Arguments for the traverse command
#[derive(Debug, Clone)]
pub struct TraverseArgs {
    pub start_id: String,
    pub max_depth: usize,
    /// Raw edge-type names; aliases are accepted, unknown names rejected
    pub edge_types: Vec<String>,
    pub direction: TraversalDirection,
    pub min_strength: f64,
}

/// Traversal output with the store the start node was found in
#[derive(Debug, Clone, Serialize)]
pub struct TraverseResult {
    pub start_id: String,
    pub nodes: Vec<TraversalNode>,
}

/// Traverse the graph from a memory. Edges live in the store of their
/// endpoints, so the walk stays inside the store that owns the start node.
pub fn traverse(ctx: &MemoryContext, args: &TraverseArgs) -> Result<TraverseResult> {
    let mut edge_types: Vec<RelationType> = Vec::new();
    for raw in &args.edge_types {
        let relation = sanitize_edge_type(raw).ok_or_else(|| {
            CortexError::InvalidInput(format!("unknown edge type {}", raw))
        })?;
        edge_types.push(relation);
    }

    for (_, store) in ctx.stores() {
        let found = store.with_connection(|conn| {
            Ok(queries::get_memory(conn, &args.start_id).ok())
        })?;
        if found.is_none() {
            continue;
        }

        let edges = store.with_connection(queries::get_all_edges)?;
        let nodes = graph_traverse(
            &args.start_id,
            &edges,
            &TraversalOptions {
                max_depth: args.max_depth,
                edge_types: edge_types.clone(),
                direction: args.direction,
                min_strength: args.min_strength,
            },
        );
        return Ok(TraverseResult {
            start_id: args.start_id.clone(),
            nodes,
        });
    }

    Err(CortexError::NotFound(args.start_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use crate::types::{Edge, EdgeStatus, Memory, MemoryType, NewMemory};
    use std::path::PathBuf;

    fn test_context() -> MemoryContext {
        MemoryContext::with_stores(
            Store::open_in_memory().unwrap(),
            Store::open_in_memory().unwrap(),
            PathBuf::from("/tmp/test"),
            None,
        )
    }

    fn seed(ctx: &MemoryContext, content: &str) -> Memory {
        let memory = Memory::new(NewMemory {
            content: content.to_string(),
            summary: content.to_string(),
            memory_type: MemoryType::Pattern,
            ..Default::default()
        })
        .unwrap();
        ctx.project
            .with_connection(|conn| queries::insert_memory(conn, &memory))
            .unwrap();
        memory
    }

    #[test]
    fn test_traverse_with_alias_filter() {
        let ctx = test_context();
        let a = seed(&ctx, "a");
        let b = seed(&ctx, "b");
        let c = seed(&ctx, "c");
        ctx.project
            .with_connection(|conn| {
                queries::insert_edge(
                    conn,
                    &Edge::new(
                        a.id.clone(),
                        b.id.clone(),
                        RelationType::DerivedFrom,
                        0.9,
                        EdgeStatus::Active,
                    )
                    .unwrap(),
                )?;
                queries::insert_edge(
                    conn,
                    &Edge::new(
                        a.id.clone(),
                        c.id.clone(),
                        RelationType::Contradicts,
                        0.9,
                        EdgeStatus::Active,
                    )
                    .unwrap(),
                )
            })
            .unwrap();

        let result = traverse(
            &ctx,
            &TraverseArgs {
                start_id: a.id.clone(),
                max_depth: 2,
                edge_types: vec!["derives".to_string()],
                direction: TraversalDirection::Outgoing,
                min_strength: 0.0,
            },
        )
        .unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].id, b.id);
    }

    #[test]
    fn test_traverse_unknown_edge_type_rejected() {
        let ctx = test_context();
        let a = seed(&ctx, "a");
        let err = traverse(
            &ctx,
            &TraverseArgs {
                start_id: a.id,
                max_depth: 2,
                edge_types: vec!["sibling_of".to_string()],
                direction: TraversalDirection::Outgoing,
                min_strength: 0.0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CortexError::InvalidInput(_)));
    }

    #[test]
    fn test_traverse_missing_start_not_found() {
        let ctx = test_context();
        let err = traverse(
            &ctx,
            &TraverseArgs {
                start_id: "ghost".to_string(),
                max_depth: 2,
                edge_types: vec![],
                direction: TraversalDirection::Both,
                min_strength: 0.0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CortexError::NotFound(_)));
    }
}
