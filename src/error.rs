//! Error types for lesson-history

use thiserror::Error;

/// Result type for history and gate operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// History error types
#[derive(Error, Debug)]
pub enum HistoryError {
    /// A record with this id is already stored
    #[error("Duplicate record id: {0}")]
    DuplicateRecord(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Attempt was asked to move from a state that does not allow it
    #[error("Invalid transition: cannot {action} an attempt that is {state}")]
    InvalidTransition { action: &'static str, state: String },

    /// Nothing is waiting for confirmation
    #[error("No pending action")]
    NoPendingAction,

    /// Remote sync failed
    #[error("Sync error: {0}")]
    Sync(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
