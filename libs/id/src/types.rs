//! Identifier definitions.

use crate::{define_id, IdError, Ulid};

// =============================================================================
// Prefixed IDs
// =============================================================================

define_id!(
    /// Surrogate key of one persisted event document.
    EventDocId,
    "evt"
);
define_id!(
    /// Correlation id generated for tool-initiated writes.
    CorrelationId,
    "cor"
);

#[doc(hidden)]
pub fn parse_prefixed(expected: &'static str, s: &str) -> Result<Ulid, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }

    let Some((prefix, ulid_str)) = s.split_once('_') else {
        return Err(IdError::MissingSeparator);
    };

    if prefix != expected {
        return Err(IdError::InvalidPrefix {
            expected,
            actual: prefix.to_string(),
        });
    }

    ulid_str
        .parse::<Ulid>()
        .map_err(|e| IdError::InvalidUlid(e.to_string()))
}

// =============================================================================
// Aggregate Version
// =============================================================================

/// Position of an event within its aggregate. Starts at 1, no gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregateVersion(i32);

impl AggregateVersion {
    /// The version of an aggregate's first event.
    pub const FIRST: Self = Self(1);

    /// Creates a version, rejecting anything below 1.
    pub fn new(version: i32) -> Result<Self, IdError> {
        if version < 1 {
            return Err(IdError::InvalidVersion(version));
        }
        Ok(Self(version))
    }

    /// Returns the underlying i32 value.
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }

    /// Returns the version that follows this one.
    pub const fn next(&self) -> Result<Self, IdError> {
        match self.0.checked_add(1) {
            Some(next) => Ok(Self(next)),
            None => Err(IdError::VersionOverflow),
        }
    }

    /// Version to claim after `last`, or [`AggregateVersion::FIRST`] for an
    /// aggregate with no events.
    pub fn after(last: Option<Self>) -> Result<Self, IdError> {
        last.map_or(Ok(Self::FIRST), |v| v.next())
    }
}

impl Default for AggregateVersion {
    fn default() -> Self {
        Self::FIRST
    }
}

impl std::fmt::Display for AggregateVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i32> for AggregateVersion {
    type Error = IdError;

    fn try_from(version: i32) -> Result<Self, Self::Error> {
        Self::new(version)
    }
}

impl From<AggregateVersion> for i32 {
    fn from(version: AggregateVersion) -> Self {
        version.0
    }
}

impl serde::Serialize for AggregateVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for AggregateVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let version = i32::deserialize(deserializer)?;
        Self::new(version).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Stream Name
// =============================================================================

/// Name of an event stream (one per aggregate kind).
///
/// Lowercase ASCII letter first, then `[a-z0-9_]`, at most
/// [`StreamName::MAX_LEN`] bytes. The name is embedded in table and index
/// identifiers by the Postgres backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamName(String);

impl StreamName {
    /// Longest accepted name; leaves room for table and index affixes
    /// within Postgres' 63-byte identifier limit.
    pub const MAX_LEN: usize = 48;

    /// Validates and wraps a stream name.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let invalid = |reason| IdError::InvalidStreamName {
            name: s.to_string(),
            reason,
        };

        let Some(first) = s.chars().next() else {
            return Err(IdError::Empty);
        };
        if s.len() > Self::MAX_LEN {
            return Err(invalid("longer than 48 bytes"));
        }
        if !first.is_ascii_lowercase() {
            return Err(invalid("must start with a lowercase letter"));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(invalid("only lowercase letters, digits and '_' are allowed"));
        }

        Ok(Self(s.to_string()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for StreamName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for StreamName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for StreamName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for StreamName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
