//! Surface generation: rank, select, render, write under lock, cache

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::cache::{store_cached_surface, write_surface_locked, CacheEntry};
use crate::config::{self, SURFACE_TOKEN_CEILING};
use crate::context::MemoryContext;
use crate::error::Result;
use crate::storage::queries;
use crate::surface::render::{enforce_token_ceiling, estimate_tokens, render_surface, RenderOptions};
use crate::surface::select_for_surface;
use crate::types::{Edge, Memory};

/// Result of one generate invocation
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResult {
    pub surface: String,
    pub memories_selected: usize,
    pub token_estimate: usize,
}

/// Generate the surface from both stores' active memories and edges,
/// write it under the PID lock, and cache it for the current branch.
pub fn generate(ctx: &MemoryContext) -> Result<GenerateResult> {
    let mut memories: Vec<Memory> = Vec::new();
    let mut edges: Vec<Edge> = Vec::new();
    for (_, store) in ctx.stores() {
        let (mut store_memories, mut store_edges) = store.with_connection(|conn| {
            Ok((
                queries::get_active_memories(conn)?,
                queries::get_all_edges(conn)?,
            ))
        })?;
        memories.append(&mut store_memories);
        edges.append(&mut store_edges);
    }

    let selected = select_for_surface(memories, &edges, ctx.branch.as_deref());
    let document = render_surface(
        &selected,
        &RenderOptions {
            branch: ctx.branch.clone(),
            stale: false,
        },
    );
    let document = enforce_token_ceiling(document, SURFACE_TOKEN_CEILING);
    let token_estimate = estimate_tokens(&document);

    write_surface_locked(
        &config::surface_path(&ctx.cwd),
        &config::lock_dir(&ctx.cwd),
        &document,
    )?;

    let entry = CacheEntry {
        surface: document.clone(),
        branch: ctx.branch.clone().unwrap_or_default(),
        cwd: ctx.cwd.to_string_lossy().into_owned(),
        generated_at: Utc::now(),
    };
    store_cached_surface(&config::cache_dir(&ctx.cwd), &entry)?;

    info!(
        memories = selected.len(),
        tokens = token_estimate,
        "surface generated"
    );
    Ok(GenerateResult {
        surface: document,
        memories_selected: selected.len(),
        token_estimate,
    })
}
