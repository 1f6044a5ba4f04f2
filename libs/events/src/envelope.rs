//! Event documents and their typed view.

use aggstore_id::{AggregateVersion, CorrelationId, EventDocId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{decode_event, encode_event, DomainEvent, EventError};

/// Provenance stamped onto every event written by one store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Groups the events caused by one request or job.
    pub correlation_id: String,

    /// Who caused the write (user, service account, job).
    pub principal_id: String,

    /// Tenant the aggregate belongs to.
    pub tenant_id: String,
}

impl EventContext {
    pub fn new(
        correlation_id: impl Into<String>,
        principal_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            principal_id: principal_id.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Context for writes issued by tooling rather than a request, with a
    /// freshly generated correlation id.
    pub fn system(tenant_id: impl Into<String>) -> Self {
        Self::new(CorrelationId::new().to_string(), "system", tenant_id)
    }
}

/// One persisted event, as stored in an event log.
///
/// Field names on the wire follow the document schema (`_id`,
/// `aggregateId`, `type`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Surrogate key, independent of `version`.
    #[serde(rename = "_id")]
    pub id: EventDocId,

    #[serde(rename = "aggregateId")]
    pub aggregate_id: String,

    /// Unique per `aggregate_id`.
    pub version: AggregateVersion,

    /// Variant tag of the domain event.
    #[serde(rename = "type")]
    pub event_type: String,

    pub payload: serde_json::Value,

    /// Set when the event is built for appending.
    pub timestamp: DateTime<Utc>,

    pub tenant_id: String,
    pub principal_id: String,
    pub correlation_id: String,
}

impl EventRecord {
    /// Builds a candidate event at `version`, stamping a fresh id, the
    /// current time, and the writer's provenance.
    pub fn new(
        aggregate_id: impl Into<String>,
        version: AggregateVersion,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        context: &EventContext,
    ) -> Self {
        Self {
            id: EventDocId::new(),
            aggregate_id: aggregate_id.into(),
            version,
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            tenant_id: context.tenant_id.clone(),
            principal_id: context.principal_id.clone(),
            correlation_id: context.correlation_id.clone(),
        }
    }

    /// Encodes a domain event and builds the candidate record for it.
    pub fn from_event<E: DomainEvent>(
        aggregate_id: impl Into<String>,
        version: AggregateVersion,
        event: &E,
        context: &EventContext,
    ) -> Result<Self, EventError> {
        let (event_type, payload) = encode_event(event)?;
        Ok(Self::new(aggregate_id, version, event_type, payload, context))
    }

    /// Decodes the payload into the aggregate's event type.
    pub fn decode<E: DomainEvent>(&self) -> Result<EventEnvelope<E>, EventError> {
        let event = decode_event(&self.event_type, &self.payload)?;
        Ok(self.to_envelope(event))
    }

    /// Pairs this record's metadata with an already-decoded event.
    pub fn to_envelope<E>(&self, event: E) -> EventEnvelope<E> {
        EventEnvelope {
            id: self.id,
            aggregate_id: self.aggregate_id.clone(),
            version: self.version,
            event_type: self.event_type.clone(),
            timestamp: self.timestamp,
            context: EventContext::new(
                self.correlation_id.clone(),
                self.principal_id.clone(),
                self.tenant_id.clone(),
            ),
            event,
        }
    }
}

/// A stored event with its payload decoded into the domain type.
///
/// This is what reducers and validators see.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope<E> {
    pub id: EventDocId,
    pub aggregate_id: String,
    pub version: AggregateVersion,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub context: EventContext,
    pub event: E,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload")]
    enum Meter {
        #[serde(rename = "reading")]
        Reading(u32),
    }

    fn ctx() -> EventContext {
        EventContext::new("cor-1", "usr-1", "tenant-1")
    }

    #[test]
    fn test_record_stamps_context() {
        let record =
            EventRecord::from_event("m-1", AggregateVersion::FIRST, &Meter::Reading(7), &ctx())
                .unwrap();

        assert_eq!(record.event_type, "reading");
        assert_eq!(record.payload, json!(7));
        assert_eq!(record.tenant_id, "tenant-1");
        assert_eq!(record.principal_id, "usr-1");
        assert_eq!(record.correlation_id, "cor-1");
        assert_eq!(record.version, AggregateVersion::FIRST);
    }

    #[test]
    fn test_record_ids_are_unique() {
        let a = EventRecord::new("m-1", AggregateVersion::FIRST, "reading", json!(1), &ctx());
        let b = EventRecord::new("m-1", AggregateVersion::FIRST, "reading", json!(1), &ctx());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_document_field_names() {
        let record = EventRecord::new("m-1", AggregateVersion::FIRST, "reading", json!(3), &ctx());
        let doc = serde_json::to_value(&record).unwrap();

        assert_eq!(doc["_id"], json!(record.id.to_string()));
        assert_eq!(doc["aggregateId"], json!("m-1"));
        assert_eq!(doc["version"], json!(1));
        assert_eq!(doc["type"], json!("reading"));
        assert_eq!(doc["tenant_id"], json!("tenant-1"));
    }

    #[test]
    fn test_decode_envelope() {
        let record = EventRecord::new("m-1", AggregateVersion::FIRST, "reading", json!(9), &ctx());
        let envelope: EventEnvelope<Meter> = record.decode().unwrap();

        assert_eq!(envelope.event, Meter::Reading(9));
        assert_eq!(envelope.context, ctx());
        assert_eq!(envelope.id, record.id);
    }

    #[test]
    fn test_system_context() {
        let context = EventContext::system("tenant-9");
        assert_eq!(context.principal_id, "system");
        assert!(context.correlation_id.starts_with("cor_"));
    }
}
