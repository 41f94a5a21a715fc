//! Markdown rendering of the memory surface
//!
//! The complete document is wrapped in literal markers so the host can
//! find and replace it; an empty candidate set renders nothing at all.

use super::{RankedMemory, CATEGORY_ORDER};
use crate::types::MemoryType;

/// Opening marker wrapping the rendered surface
pub const SURFACE_START_MARKER: &str = "<!-- CORTEX_MEMORY_START -->";

/// Closing marker wrapping the rendered surface
pub const SURFACE_END_MARKER: &str = "<!-- CORTEX_MEMORY_END -->";

/// Truncation notice appended when the token ceiling forces a cut
pub const TRUNCATION_NOTICE: &str = "*[Truncated to fit token budget]*";

/// Rendering inputs beyond the selected memories
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub branch: Option<String>,
    /// Set when rendering a cached surface older than 24 hours
    pub stale: bool,
}

fn section_title(memory_type: MemoryType) -> &'static str {
    match memory_type {
        MemoryType::Architecture => "Architecture",
        MemoryType::Decision => "Decisions",
        MemoryType::Pattern => "Patterns",
        MemoryType::Gotcha => "Gotchas",
        MemoryType::Context => "Context",
        MemoryType::Progress => "Progress",
        MemoryType::CodeDescription => "Code Notes",
        MemoryType::Code => "Code",
    }
}

/// Render the selected memories as a marker-wrapped markdown document.
/// Returns the empty string for an empty selection.
pub fn render_surface(selected: &[RankedMemory], options: &RenderOptions) -> String {
    if selected.is_empty() {
        return String::new();
    }

    let mut doc = String::new();
    doc.push_str(SURFACE_START_MARKER);
    doc.push_str("\n# Project Memory\n");

    if let Some(branch) = &options.branch {
        doc.push_str(&format!("\n**Branch:** {}\n", branch));
    }
    if options.stale {
        doc.push_str("\n> Note: this memory surface is more than 24 hours old.\n");
    }

    for memory_type in CATEGORY_ORDER {
        let entries: Vec<&RankedMemory> = selected
            .iter()
            .filter(|r| r.memory.memory_type == memory_type)
            .collect();
        if entries.is_empty() {
            continue;
        }

        doc.push_str(&format!("\n## {}\n\n", section_title(memory_type)));
        for entry in entries {
            let mut lines = entry.memory.summary.split('\n');
            if let Some(first) = lines.next() {
                doc.push_str(&format!("- {}\n", first));
            }
            for continuation in lines {
                doc.push_str(&format!("  {}\n", continuation));
            }
            if !entry.memory.tags.is_empty() {
                doc.push_str(&format!("  *Tags: {}*\n", entry.memory.tags.join(", ")));
            }
        }
    }

    doc.push('\n');
    doc.push_str(SURFACE_END_MARKER);
    doc.push('\n');
    doc
}

/// Estimated token count: ceil(chars / 4)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Enforce the token ceiling. Documents over `max_tokens * 1.1` are cut at
/// the last newline within `max_tokens * 4` characters, with a truncation
/// notice appended.
pub fn enforce_token_ceiling(document: String, max_tokens: usize) -> String {
    let estimated = estimate_tokens(&document);
    if (estimated as f64) <= max_tokens as f64 * 1.1 {
        return document;
    }

    let char_limit = max_tokens * 4;
    let prefix: String = document.chars().take(char_limit).collect();
    let cut = prefix.rfind('\n').unwrap_or(prefix.len());

    let mut truncated = prefix[..cut].to_string();
    truncated.push('\n');
    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}

/// Strip the wrapping markers from a surface document, if present
pub fn strip_markers(document: &str) -> &str {
    let inner = document
        .trim()
        .strip_prefix(SURFACE_START_MARKER)
        .unwrap_or(document);
    inner
        .trim_end()
        .strip_suffix(SURFACE_END_MARKER)
        .unwrap_or(inner)
        .trim()
}
