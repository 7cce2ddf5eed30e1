//! Error taxonomy shared by every Upkeep crate.

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, UpkeepError>;

#[derive(Debug, Error)]
pub enum UpkeepError {
    /// Malformed input on create/update. Nothing was persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unrecognized recurrence frequency.
    #[error("invalid frequency: '{0}'")]
    InvalidFrequency(String),

    /// Transient infrastructure failure. Safe to retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Referenced record, asset or notification does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Another edit changed the record after it was read. Reload and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UpkeepError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Io(_))
    }
}
