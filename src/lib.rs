//! Cortex - persistent knowledge memory for AI coding assistants
//!
//! Extracts durable facts from session transcripts, stores them in local
//! SQLite stores with a typed relationship graph, decays their confidence
//! over time, and renders a bounded markdown surface for future sessions.

pub mod cache;
pub mod commands;
pub mod config;
pub mod context;
pub mod decay;
pub mod error;
pub mod extract;
pub mod git;
pub mod graph;
pub mod lifecycle;
pub mod providers;
pub mod similarity;
pub mod storage;
pub mod surface;
pub mod telemetry;
pub mod types;

pub use context::MemoryContext;
pub use error::{CortexError, Result};
pub use storage::Store;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
