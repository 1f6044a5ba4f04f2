//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when encoding or decoding events.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// The stored event type is not a variant of the domain event.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The event did not serialize to a `{type, payload}` shape.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
