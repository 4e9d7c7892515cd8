//! Error types

use thiserror::Error;

/// Core errors shared by every crate in the workspace
#[derive(Error, Debug)]
pub enum Error {
    /// Utterance arrived earlier than the ordering contract allows
    #[error("Out-of-order utterance at {timestamp_ms}ms (last ingested {last_timestamp_ms}ms, tolerance {tolerance_ms}ms)")]
    OutOfOrder {
        timestamp_ms: u64,
        last_timestamp_ms: u64,
        tolerance_ms: u64,
    },

    /// Utterance is missing a required field
    #[error("Malformed utterance: {0}")]
    MalformedUtterance(String),

    /// SOP rule set or engine settings are unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Session was already finalized
    #[error("Session already finalized")]
    SessionFinalized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error only concerns a single utterance and the session may continue
    pub fn is_local(&self) -> bool {
        matches!(self, Error::OutOfOrder { .. } | Error::MalformedUtterance(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
