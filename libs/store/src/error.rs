//! Store error types.

use std::time::Duration;

use aggstore_events::EventError;
use aggstore_id::IdError;
use thiserror::Error;

/// A domain rule rejected the candidate event.
///
/// Returned by an aggregate's validator; the message is what the caller sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Event store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Another writer already claimed this version (optimistic concurrency).
    #[error("version conflict in stream '{stream}': aggregate {aggregate_id} already has version {version}")]
    VersionConflict {
        stream: String,
        aggregate_id: String,
        version: i32,
    },

    /// The aggregate already holds `i32::MAX` events.
    #[error("aggregate {aggregate_id} in stream '{stream}' has no version left to claim")]
    VersionExhausted { stream: String, aggregate_id: String },

    /// The aggregate's validator rejected the transition.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Version conflicts persisted past the retry budget.
    #[error("gave up after {attempts} attempts in {elapsed:?}: {source}")]
    RetriesExhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: Box<StoreError>,
    },

    /// The stream was never registered or initialized.
    #[error("stream not registered: {0}")]
    UnknownStream(String),

    /// The stream name is not a valid identifier.
    #[error("invalid stream: {0}")]
    InvalidStream(#[from] IdError),

    /// Event encoding or decoding failed.
    #[error("event codec error: {0}")]
    Event(#[from] EventError),

    /// A stored row does not form a valid event.
    #[error("corrupt event row in stream '{stream}': {message}")]
    CorruptRow { stream: String, message: String },
}

impl StoreError {
    /// Returns true for errors the retry loop recovers from.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    /// Returns true if a domain rule rejected the event.
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    /// Returns the validation failure, if that is what this error is.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            StoreError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_is_transparent() {
        let err = StoreError::from(ValidationError::new("Deposit amount must be greater than 0"));
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Deposit amount must be greater than 0");
    }

    #[test]
    fn test_retries_exhausted_wraps_conflict() {
        let conflict = StoreError::VersionConflict {
            stream: "ledger".to_string(),
            aggregate_id: "acct-1".to_string(),
            version: 4,
        };
        assert!(conflict.is_conflict());

        let err = StoreError::RetriesExhausted {
            attempts: 6,
            elapsed: Duration::from_millis(1500),
            source: Box::new(conflict),
        };
        assert!(!err.is_conflict());
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("already has version 4"));
    }
}
