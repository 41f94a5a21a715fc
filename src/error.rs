//! Error types for Cortex

use thiserror::Error;

/// Result type alias for Cortex operations
pub type Result<T> = std::result::Result<T, CortexError>;

/// Main error type for Cortex
#[derive(Error, Debug)]
pub enum CortexError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider failed: {0}")]
    ProviderFailed(String),

    #[error("Provider timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to parse provider output: {0}")]
    ParseFailed(String),

    #[error("Surface lock held by live process {0}")]
    LockHeld(u32),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

impl CortexError {
    /// Fatal errors abort the command with a non-zero exit; everything else
    /// is reported inside the structured result.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CortexError::InvalidInput(_))
    }

    /// Whether a provider error should degrade gracefully (skip the
    /// operation) rather than surface to the user.
    pub fn is_provider_degradation(&self) -> bool {
        matches!(
            self,
            CortexError::ProviderUnavailable(_)
                | CortexError::ProviderFailed(_)
                | CortexError::Timeout(_)
        )
    }
}
