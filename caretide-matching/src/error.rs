//! Error types for the matching core

use thiserror::Error;

/// Result type for matching operations
pub type MatchingResult<T> = Result<T, MatchingError>;

/// Error taxonomy surfaced to callers of the matching core
#[derive(Error, Debug)]
pub enum MatchingError {
    /// Referenced shift, proposal, caregiver, or configuration is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness invariant violated (duplicate shift, already-assigned claim)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input rejected by schema or business rule
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Self-select claim scored below the configured minimum
    #[error("Score {score} is below the required minimum {minimum_required}")]
    ScoreBelowThreshold { score: u8, minimum_required: u8 },

    /// Illegal state machine transition
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Lost the shift status CAS to a concurrent matcher; retryable
    #[error("Concurrent matcher holds shift {0}")]
    Concurrency(String),

    /// Caller-supplied deadline elapsed; in-progress state was rolled back
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Authorization context lacks the required capability
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Downstream read or write failed
    #[error("Data port error: {0}")]
    DataPort(String),

    /// Store persistence error
    #[error("Store error: {0}")]
    Store(String),

    /// Runtime settings error
    #[error("Settings error: {0}")]
    Settings(#[from] caretide_config::SettingsError),
}

impl MatchingError {
    /// Whether a caller may retry the operation after backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchingError::Concurrency(_) | MatchingError::DataPort(_))
    }
}

impl From<sled::Error> for MatchingError {
    fn from(err: sled::Error) -> Self {
        MatchingError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for MatchingError {
    fn from(err: serde_json::Error) -> Self {
        MatchingError::Store(format!("row encoding: {}", err))
    }
}
