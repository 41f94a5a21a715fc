//! Session telemetry
//!
//! A small JSON file of counters and last-run timestamps under the
//! project's `.memory/` directory. Writes are last-writer-wins across
//! concurrent processes; load tolerates absence and corruption.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Counters and timestamps persisted across sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    pub sessions: u64,
    #[serde(default)]
    pub extractions: u64,
    #[serde(default)]
    pub memories_created: u64,
    pub last_lifecycle_at: Option<DateTime<Utc>>,
    pub last_ai_prune_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sessions_since_ai_prune: u64,
}

impl Telemetry {
    /// Load telemetry, falling back to defaults when the file is absent
    /// or unreadable
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("telemetry file corrupt, starting fresh: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist telemetry; last writer wins
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
