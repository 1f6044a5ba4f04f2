//! Splitting domain events into `(type, payload)` and back.

use std::fmt;

use serde::de::{self, value::MapDeserializer, DeserializeOwned};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::EventError;

const TYPE_KEY: &str = "type";
const PAYLOAD_KEY: &str = "payload";

/// A domain event union.
///
/// Implemented for every adjacently tagged serde enum
/// (`#[serde(tag = "type", content = "payload")]`).
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> DomainEvent for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Splits an event into its type tag and payload.
///
/// Unit variants yield a `null` payload.
pub fn encode_event<E: DomainEvent>(event: &E) -> Result<(String, Value), EventError> {
    let Value::Object(mut obj) = serde_json::to_value(event)? else {
        return Err(EventError::InvalidPayload(
            "event must serialize to an object with a `type` tag".to_string(),
        ));
    };

    let event_type = match obj.remove(TYPE_KEY) {
        Some(Value::String(event_type)) => event_type,
        _ => {
            return Err(EventError::InvalidPayload(
                "event is missing a string `type` tag".to_string(),
            ))
        }
    };
    let payload = obj.remove(PAYLOAD_KEY).unwrap_or(Value::Null);

    if !obj.is_empty() {
        return Err(EventError::InvalidPayload(format!(
            "event {event_type} has fields outside `payload`; use adjacent tagging"
        )));
    }

    Ok((event_type, payload))
}

/// Rebuilds a domain event from a stored type tag and payload.
pub fn decode_event<E: DomainEvent>(event_type: &str, payload: &Value) -> Result<E, EventError> {
    if !is_known_tag::<E>(event_type) {
        return Err(EventError::UnknownEventType(event_type.to_string()));
    }

    let mut obj = Map::new();
    obj.insert(TYPE_KEY.to_string(), Value::String(event_type.to_string()));

    if payload.is_null() {
        // Unit variants carry no content key; newtype variants over an
        // Option still expect one.
        if let Ok(event) = serde_json::from_value(Value::Object(obj.clone())) {
            return Ok(event);
        }
    }

    obj.insert(PAYLOAD_KEY.to_string(), payload.clone());
    Ok(serde_json::from_value(Value::Object(obj))?)
}

/// Outcome of deserializing a bare `{type}` map: whether serde rejected the
/// tag itself or something after it.
#[derive(Debug)]
enum TagCheck {
    Unknown,
    Other,
}

impl fmt::Display for TagCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown event type"),
            Self::Other => f.write_str("event rejected after its type"),
        }
    }
}

impl std::error::Error for TagCheck {}

impl de::Error for TagCheck {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Self::Other
    }

    fn unknown_variant(_variant: &str, _expected: &'static [&'static str]) -> Self {
        Self::Unknown
    }
}

/// Whether `E` has a variant tagged `event_type`. The tag is read before the
/// payload, so a known tag with no payload fails with a missing field
/// instead.
fn is_known_tag<E: DomainEvent>(event_type: &str) -> bool {
    let entries = std::iter::once((TYPE_KEY, event_type));
    let deserializer = MapDeserializer::<_, TagCheck>::new(entries);
    !matches!(E::deserialize(deserializer), Err(TagCheck::Unknown))
}
