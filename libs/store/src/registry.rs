//! Registry of the event streams an application writes to.
//!
//! Streams are registered up front and initialized together at startup, so
//! storage setup failures surface before the first request instead of on it.

use std::collections::BTreeMap;

use aggstore_events::{DomainEvent, EventContext};
use aggstore_id::StreamName;
use tracing::info;

use crate::aggregate::{AggregateRules, AggregateStore};
use crate::log::{EventBackend, EventLog};
use crate::StoreError;

/// Named event logs sharing one backend.
pub struct StreamRegistry<B: EventBackend> {
    backend: B,
    logs: BTreeMap<StreamName, EventLog<B>>,
}

impl<B: EventBackend> StreamRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            logs: BTreeMap::new(),
        }
    }

    /// Registers a stream and returns its log. Registering the same name
    /// again returns the existing log.
    pub fn register(&mut self, name: &str) -> Result<EventLog<B>, StoreError> {
        let stream = StreamName::parse(name)?;
        let log = self
            .logs
            .entry(stream.clone())
            .or_insert_with(|| EventLog::new(self.backend.clone(), stream));
        Ok(log.clone())
    }

    /// Creates storage for every registered stream.
    pub async fn init(&self) -> Result<(), StoreError> {
        for log in self.logs.values() {
            log.ensure_ready().await?;
        }
        info!(streams = self.logs.len(), "event streams initialized");
        Ok(())
    }

    /// Looks up a registered stream.
    pub fn log(&self, name: &str) -> Result<EventLog<B>, StoreError> {
        let stream = StreamName::parse(name)?;
        self.logs
            .get(&stream)
            .cloned()
            .ok_or_else(|| StoreError::UnknownStream(stream.to_string()))
    }

    /// Names of all registered streams, sorted.
    pub fn streams(&self) -> impl Iterator<Item = &StreamName> {
        self.logs.keys()
    }

    /// Builds an aggregate store over a registered stream.
    pub fn store<S, E>(
        &self,
        name: &str,
        default_state: S,
        rules: AggregateRules<S, E>,
        context: EventContext,
    ) -> Result<AggregateStore<B, S, E>, StoreError>
    where
        S: Clone + Send + Sync + 'static,
        E: DomainEvent,
    {
        Ok(AggregateStore::new(
            self.log(name)?,
            default_state,
            rules,
            context,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryBackend;

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = StreamRegistry::new(MemoryBackend::new());
        registry.register("orders").unwrap();
        registry.register("orders").unwrap();
        registry.register("accounts").unwrap();

        let names: Vec<&str> = registry.streams().map(StreamName::as_str).collect();
        assert_eq!(names, vec!["accounts", "orders"]);
    }

    #[test]
    fn test_register_rejects_invalid_name() {
        let mut registry = StreamRegistry::new(MemoryBackend::new());
        let err = registry.register("Robert'); DROP TABLE").unwrap_err();
        assert!(matches!(err, StoreError::InvalidStream(_)));
    }

    #[test]
    fn test_unknown_stream() {
        let registry = StreamRegistry::new(MemoryBackend::new());
        let err = registry.log("orders").unwrap_err();
        assert!(matches!(err, StoreError::UnknownStream(name) if name == "orders"));
    }

    #[tokio::test]
    async fn test_init_creates_every_stream() {
        let backend = MemoryBackend::new();
        let mut registry = StreamRegistry::new(backend.clone());
        registry.register("orders").unwrap();
        registry.register("accounts").unwrap();
        registry.init().await.unwrap();

        let orders = StreamName::parse("orders").unwrap();
        assert!(backend.load(&orders, "o-1", None).await.unwrap().is_empty());
    }
}
