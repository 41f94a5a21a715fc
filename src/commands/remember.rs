//! Manual memory creation and archival

use serde::Serialize;

use crate::context::MemoryContext;
use crate::error::Result;
use crate::storage::queries;
use crate::types::{
    Memory, MemoryPatch, MemoryStatus, MemoryType, NewMemory, Scope, SourceType,
    MAX_MANUAL_SUMMARY_CHARS,
};

/// Arguments for the remember command
#[derive(Debug, Clone)]
pub struct RememberArgs {
    pub content: String,
    pub summary: Option<String>,
    pub memory_type: MemoryType,
    pub scope: Scope,
    pub tags: Vec<String>,
    pub priority: i64,
    pub pinned: bool,
}

/// Create a manual memory with full confidence and no embeddings (those
/// arrive via backfill). Routed to the store matching its scope.
pub fn remember(ctx: &MemoryContext, args: RememberArgs) -> Result<Memory> {
    let summary = args.summary.unwrap_or_else(|| {
        args.content
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(MAX_MANUAL_SUMMARY_CHARS)
            .collect()
    });

    let memory = Memory::new(NewMemory {
        content: args.content,
        summary,
        memory_type: args.memory_type,
        scope: args.scope,
        confidence: 1.0,
        priority: args.priority,
        pinned: args.pinned,
        source_type: SourceType::Manual,
        tags: args.tags,
        ..Default::default()
    })?;

    ctx.store_for(args.scope)
        .with_connection(|conn| queries::insert_memory(conn, &memory))?;
    Ok(memory)
}

/// Result of a forget invocation
#[derive(Debug, Clone, Serialize)]
pub struct ForgetResult {
    pub id: String,
    pub status: MemoryStatus,
    /// False when the memory was already archived
    pub changed: bool,
}

/// Archive a memory by id. Idempotent: archiving an archived memory
/// succeeds without change. Searches the project store first.
pub fn forget(ctx: &MemoryContext, id: &str) -> Result<ForgetResult> {
    for (_, store) in ctx.stores() {
        let found = store.with_connection(|conn| {
            Ok(queries::get_memory(conn, id).ok())
        })?;
        let Some(memory) = found else {
            continue;
        };

        if memory.status == MemoryStatus::Archived {
            return Ok(ForgetResult {
                id: id.to_string(),
                status: MemoryStatus::Archived,
                changed: false,
            });
        }

        let updated = store.with_connection(|conn| {
            queries::update_memory(
                conn,
                id,
                &MemoryPatch {
                    status: Some(MemoryStatus::Archived),
                    ..Default::default()
                },
            )
        })?;
        return Ok(ForgetResult {
            id: id.to_string(),
            status: updated.status,
            changed: true,
        });
    }

    Err(crate::error::CortexError::NotFound(id.to_string()))
}

/// Fuzzy forget: return active-memory candidates matching the query, for
/// external confirmation. Never archives anything itself.
pub fn forget_candidates(
    ctx: &MemoryContext,
    query: &str,
    limit: usize,
) -> Result<Vec<Memory>> {
    let mut results = Vec::new();
    for (_, store) in ctx.stores() {
        let matches =
            store.with_connection(|conn| queries::search_active_by_keyword(conn, query, limit))?;
        results.extend(matches);
    }
    results.truncate(limit);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use crate::types::MemoryStatus;
    use std::path::PathBuf;

    fn test_context() -> MemoryContext {
        MemoryContext::with_stores(
            Store::open_in_memory().unwrap(),
            Store::open_in_memory().unwrap(),
            PathBuf::from("/tmp/test"),
            None,
        )
    }

    fn args(content: &str, scope: Scope) -> RememberArgs {
        RememberArgs {
            content: content.to_string(),
            summary: None,
            memory_type: MemoryType::Decision,
            scope,
            tags: vec![],
            priority: 5,
            pinned: false,
        }
    }

    #[test]
    fn test_remember_routes_by_scope() {
        let ctx = test_context();
        let project = remember(&ctx, args("project memory", Scope::Project)).unwrap();
        let global = remember(&ctx, args("global memory", Scope::Global)).unwrap();

        assert!(ctx
            .project
            .with_connection(|conn| Ok(queries::get_memory(conn, &project.id).ok()))
            .unwrap()
            .is_some());
        assert!(ctx
            .global
            .with_connection(|conn| Ok(queries::get_memory(conn, &project.id).ok()))
            .unwrap()
            .is_none());
        assert!(ctx
            .global
            .with_connection(|conn| Ok(queries::get_memory(conn, &global.id).ok()))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_remember_defaults() {
        let ctx = test_context();
        let memory = remember(&ctx, args("a decision was made", Scope::Project)).unwrap();
        assert_eq!(memory.confidence, 1.0);
        assert_eq!(memory.source_type, SourceType::Manual);
        assert!(memory.embedding.is_none());
        assert!(memory.local_embedding.is_none());
        assert_eq!(memory.summary, "a decision was made");
    }

    #[test]
    fn test_remember_derives_first_line_summary() {
        let ctx = test_context();
        let memory = remember(
            &ctx,
            args("first line\nsecond line with more detail", Scope::Project),
        )
        .unwrap();
        assert_eq!(memory.summary, "first line");
    }

    #[test]
    fn test_forget_idempotent() {
        let ctx = test_context();
        let memory = remember(&ctx, args("to be forgotten", Scope::Project)).unwrap();

        let first = forget(&ctx, &memory.id).unwrap();
        assert!(first.changed);
        assert_eq!(first.status, MemoryStatus::Archived);

        let second = forget(&ctx, &memory.id).unwrap();
        assert!(!second.changed);
        assert_eq!(second.status, MemoryStatus::Archived);
    }

    #[test]
    fn test_forget_missing_is_not_found() {
        let ctx = test_context();
        assert!(forget(&ctx, "missing-id").is_err());
    }

    #[test]
    fn test_forget_candidates_active_only() {
        let ctx = test_context();
        let keep = remember(&ctx, args("flaky integration test", Scope::Project)).unwrap();
        let gone = remember(&ctx, args("flaky unit test", Scope::Project)).unwrap();
        forget(&ctx, &gone.id).unwrap();

        let candidates = forget_candidates(&ctx, "flaky", 10).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, keep.id);
    }
}
