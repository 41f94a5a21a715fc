//! Code indexing: one prose description plus the raw code, linked and
//! superseding any previous index of the same file path

use serde::Serialize;
use tracing::debug;

use crate::context::MemoryContext;
use crate::error::Result;
use crate::providers::EmbeddingProvider;
use crate::storage::queries;
use crate::types::{
    CodeSourceContext, Edge, EdgeStatus, Memory, MemoryPatch, MemoryStatus, MemoryType,
    NewMemory, RelationType, Scope, SourceType,
};

/// Arguments for the index-code command
#[derive(Debug, Clone)]
pub struct IndexCodeArgs {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Prose description of what the code does
    pub description: String,
    /// The raw code, stored verbatim and never embedded
    pub code: String,
    pub tags: Vec<String>,
}

/// Result of indexing one code span
#[derive(Debug, Clone, Serialize)]
pub struct IndexCodeResult {
    pub description_id: String,
    pub code_id: String,
    pub superseded: usize,
}

/// Index a code span into the project store. The description is embedded
/// when a provider is available; prior code and prose memories for the
/// same path are superseded with edges from their replacements. All
/// writes happen in one transaction.
pub async fn index_code(
    ctx: &MemoryContext,
    args: IndexCodeArgs,
    embedder: Option<&dyn EmbeddingProvider>,
) -> Result<IndexCodeResult> {
    let source_context = serde_json::to_string(&CodeSourceContext {
        file_path: args.file_path.clone(),
        start_line: args.start_line,
        end_line: args.end_line,
    })?;

    // Embed outside the transaction; a provider failure only queues the
    // description for backfill.
    let description_embedding = match embedder {
        Some(provider) if provider.available() => {
            match provider.embed_batch(&[args.description.clone()]).await {
                Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
                Ok(_) => None,
                Err(e) => {
                    debug!("description embedding failed, queuing for backfill: {}", e);
                    None
                }
            }
        }
        _ => None,
    };

    let description = Memory::new(NewMemory {
        content: args.description.clone(),
        summary: args.description.clone(),
        memory_type: MemoryType::CodeDescription,
        scope: Scope::Project,
        source_type: SourceType::CodeIndex,
        source_context: Some(source_context.clone()),
        tags: args.tags.clone(),
        embedding: description_embedding,
        ..Default::default()
    })?;

    let code = Memory::new(NewMemory {
        content: args.code.clone(),
        summary: format!(
            "{}:{}-{}",
            args.file_path, args.start_line, args.end_line
        ),
        memory_type: MemoryType::Code,
        scope: Scope::Project,
        source_type: SourceType::CodeIndex,
        source_context: Some(source_context),
        tags: args.tags,
        ..Default::default()
    })?;

    let file_path = args.file_path;
    let description_id = description.id.clone();
    let code_id = code.id.clone();

    let superseded = ctx.project.with_transaction(|conn| {
        let prior_code = queries::get_active_code_memories_by_file_path(conn, &file_path)?;
        let prior_prose = queries::get_active_prose_memories_by_file_path(conn, &file_path)?;

        queries::insert_memory(conn, &description)?;
        queries::insert_memory(conn, &code)?;

        let mut superseded = 0;
        for (prior, successor_id) in prior_code
            .iter()
            .map(|m| (m, &code_id))
            .chain(prior_prose.iter().map(|m| (m, &description_id)))
        {
            queries::update_memory(
                conn,
                &prior.id,
                &MemoryPatch {
                    status: Some(MemoryStatus::Superseded),
                    ..Default::default()
                },
            )?;
            let edge = Edge::new(
                successor_id.clone(),
                prior.id.clone(),
                RelationType::Supersedes,
                1.0,
                EdgeStatus::Active,
            )?;
            queries::insert_edge(conn, &edge)?;
            superseded += 1;
        }

        // The prose is the source of the code it describes
        let source_edge = Edge::new(
            description_id.clone(),
            code_id.clone(),
            RelationType::SourceOf,
            1.0,
            EdgeStatus::Active,
        )?;
        queries::insert_edge(conn, &source_edge)?;

        Ok(superseded)
    })?;

    Ok(IndexCodeResult {
        description_id,
        code_id,
        superseded,
    })
}
