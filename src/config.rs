//! Tunables and on-disk layout
//!
//! Every knob the engine recognizes lives here as a constant, next to the
//! path helpers that define where the stores, surface, cache, locks, and
//! telemetry live relative to a project directory and the user's home.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CortexError, Result};

/// Maximum transcript bytes consumed per extraction run
pub const TRANSCRIPT_BYTE_CAP: u64 = 100 * 1024;

/// Hard deadline for the extraction provider
pub const EXTRACTION_TIMEOUT_SECS: u64 = 30;

/// Token overhead reserved for the host's own framing around the surface
pub const SURFACE_TOKEN_OVERHEAD: usize = 200;

/// Target token size for a generated surface
pub const SURFACE_TOKEN_TARGET: usize = 1500 - SURFACE_TOKEN_OVERHEAD;

/// Hard ceiling for a generated surface
pub const SURFACE_TOKEN_CEILING: usize = 2000 - SURFACE_TOKEN_OVERHEAD;

/// A cached surface older than this is stale
pub const SURFACE_STALE_HOURS: i64 = 24;

/// Lifecycle runs at least this often even without new memories
pub const LIFECYCLE_FALLBACK_HOURS: i64 = 24;

/// Confidence floor below which a memory is a candidate for archival
pub const ARCHIVE_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Days below the confidence floor before archival
pub const ARCHIVE_AFTER_DAYS: f64 = 14.0;

/// Days archived without access before pruning
pub const PRUNE_AFTER_DAYS: f64 = 30.0;

/// Default recall result limit
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Default graph traversal depth
pub const DEFAULT_TRAVERSAL_DEPTH: usize = 2;

/// Primary embedding dimensions (f64 components)
pub const EMBEDDING_DIM: usize = 768;

/// Fallback local embedding dimensions (f32 components)
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Maximum texts per embedding provider call
pub const EMBED_BATCH_CAP: usize = 100;

/// Store file name shared by the project and global stores
pub const STORE_FILE: &str = "cortex.db";

/// Surface file name under `{cwd}/.claude/`
pub const SURFACE_FILE: &str = "cortex-memory.md";

/// Project-scope store: `{cwd}/.memory/cortex.db`
pub fn project_store_path(cwd: &Path) -> PathBuf {
    cwd.join(".memory").join(STORE_FILE)
}

/// User-global store: `{home}/.claude/memory/cortex.db`
pub fn global_store_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CortexError::Store("cannot resolve home directory".to_string()))?;
    Ok(home.join(".claude").join("memory").join(STORE_FILE))
}

/// Generated surface: `{cwd}/.claude/cortex-memory.md`
pub fn surface_path(cwd: &Path) -> PathBuf {
    cwd.join(".claude").join(SURFACE_FILE)
}

/// Surface cache directory: `{cwd}/.memory/surface-cache/`
pub fn cache_dir(cwd: &Path) -> PathBuf {
    cwd.join(".memory").join("surface-cache")
}

/// Lock directory: `{cwd}/.memory/locks/`
pub fn lock_dir(cwd: &Path) -> PathBuf {
    cwd.join(".memory").join("locks")
}

/// Telemetry file: `{cwd}/.memory/telemetry.json`
pub fn telemetry_path(cwd: &Path) -> PathBuf {
    cwd.join(".memory").join("telemetry.json")
}

/// Ensure `.gitignore` covers the memory directory and the surface file.
/// Creates the file when missing; appends only the missing entries.
pub fn ensure_gitignore(cwd: &Path) -> Result<()> {
    let gitignore = cwd.join(".gitignore");
    let surface_entry = format!(".claude/{}", SURFACE_FILE);
    let wanted = [".memory/", surface_entry.as_str()];

    let existing = match fs::read_to_string(&gitignore) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let present: Vec<&str> = existing.lines().map(str::trim).collect();
    let missing: Vec<&str> = wanted
        .iter()
        .copied()
        .filter(|entry| !present.contains(entry))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&gitignore)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(file)?;
    }
    for entry in missing {
        writeln!(file, "{}", entry)?;
    }
    Ok(())
}
