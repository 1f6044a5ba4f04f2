//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID has an invalid prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// Aggregate versions start at 1.
    #[error("invalid aggregate version {0}: versions start at 1")]
    InvalidVersion(i32),

    /// The aggregate already holds the largest representable version.
    #[error("aggregate version overflow: no version follows {}", i32::MAX)]
    VersionOverflow,

    /// The stream name cannot be used as a stream identifier.
    #[error("invalid stream name '{name}': {reason}")]
    InvalidStreamName { name: String, reason: &'static str },
}
