//! Error types for PubScout.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Every failure the pipeline can surface.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Store or queue temporarily unreachable (busy, locked, connection reset).
    #[error("Temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Writer service error: {0}")]
    Writer(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Publication not found: {0}")]
    PublicationNotFound(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid idea status transition: {0}")]
    InvalidTransition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ScoutError {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn writer(msg: impl Into<String>) -> Self {
        Self::Writer(msg.into())
    }

    pub fn workflow(msg: impl Into<String>) -> Self {
        Self::Workflow(msg.into())
    }

    /// Whether a bounded retry at the call site may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ScoutError::Unavailable("busy".into()).is_transient());
        assert!(!ScoutError::database("constraint").is_transient());
        assert!(!ScoutError::PublicationNotFound("p1".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let e = ScoutError::InvalidTimezone("Mars/Olympus".into());
        assert_eq!(e.to_string(), "Invalid timezone: Mars/Olympus");
    }
}
