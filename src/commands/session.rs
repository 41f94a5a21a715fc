//! Session hooks
//!
//! Session start serves the cached surface or regenerates it; session end
//! extracts from the transcript and regenerates. Neither may block the
//! host: failures degrade to an empty surface or a structured error.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::load_cached_surface;
use crate::commands::generate::generate;
use crate::config;
use crate::context::MemoryContext;
use crate::error::Result;
use crate::extract::{run_extraction, ExtractionResult, HookInput};
use crate::providers::LlmProvider;
use crate::telemetry::Telemetry;

/// Result of the session-start hook
#[derive(Debug, Clone, Serialize)]
pub struct SessionStartResult {
    pub surface: String,
    pub from_cache: bool,
    pub stale: bool,
}

/// Serve the surface for a starting session: a fresh cache hit is
/// returned as-is; a miss or stale entry triggers regeneration, falling
/// back to the stale copy if generation fails.
pub fn session_start(ctx: &MemoryContext) -> Result<SessionStartResult> {
    if let Err(e) = config::ensure_gitignore(&ctx.cwd) {
        warn!("gitignore maintenance failed: {}", e);
    }

    let telemetry_path = config::telemetry_path(&ctx.cwd);
    let mut telemetry = Telemetry::load(&telemetry_path);
    telemetry.sessions += 1;
    telemetry.sessions_since_ai_prune += 1;
    if let Err(e) = telemetry.save(&telemetry_path) {
        warn!("telemetry save failed: {}", e);
    }

    let branch = ctx.branch.clone().unwrap_or_default();
    let cwd = ctx.cwd.to_string_lossy().into_owned();
    let cached = load_cached_surface(&config::cache_dir(&ctx.cwd), &branch, &cwd, Utc::now());

    if let Some(hit) = &cached {
        if !hit.stale {
            info!("serving cached surface");
            return Ok(SessionStartResult {
                surface: hit.entry.surface.clone(),
                from_cache: true,
                stale: false,
            });
        }
    }

    match generate(ctx) {
        Ok(result) => Ok(SessionStartResult {
            surface: result.surface,
            from_cache: false,
            stale: false,
        }),
        Err(e) => {
            warn!("generation failed: {}", e);
            if let Some(hit) = cached {
                // A stale surface beats no surface
                return Ok(SessionStartResult {
                    surface: hit.entry.surface,
                    from_cache: true,
                    stale: true,
                });
            }
            Err(e)
        }
    }
}

/// Result of the session-end hook
#[derive(Debug, Clone, Serialize)]
pub struct SessionEndResult {
    pub extraction: ExtractionResult,
    pub surface_regenerated: bool,
}

/// Session end: extract new memories from the transcript, then
/// regenerate the surface. Generation failure never masks the
/// extraction result.
pub async fn session_end(
    ctx: &MemoryContext,
    llm: &dyn LlmProvider,
    hook: &HookInput,
) -> SessionEndResult {
    let extraction = run_extraction(ctx, llm, hook).await;

    let surface_regenerated = match generate(ctx) {
        Ok(_) => true,
        Err(e) => {
            warn!("surface regeneration failed: {}", e);
            false
        }
    };

    SessionEndResult {
        extraction,
        surface_regenerated,
    }
}
