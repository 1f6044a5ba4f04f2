//! Event log: append-only, versioned event storage per stream.
//!
//! A backend provides the storage primitives (uniqueness on
//! `(aggregate_id, version)`, transactional sessions). [`EventLog`] binds a
//! backend to one stream and makes sure the stream's storage exists before
//! first use.

mod memory;
mod postgres;

use std::sync::Arc;

use aggstore_events::EventRecord;
use aggstore_id::StreamName;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::StoreError;

pub use memory::{MemoryBackend, MemorySession};
pub use postgres::{PgBackend, PgSession};

/// A storage transaction spanning any number of reads and appends.
///
/// Reads made through a session see its own uncommitted appends; nobody else
/// sees them until [`Session::commit`]. Dropping a session without committing
/// aborts it.
#[async_trait]
pub trait Session: Send {
    /// Makes every append made through this session visible atomically.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discards every append made through this session.
    async fn abort(self) -> Result<(), StoreError>;
}

/// Storage primitives an event log runs on.
///
/// `insert` must fail with [`StoreError::VersionConflict`] when the
/// `(aggregate_id, version)` pair is already taken, atomically with the write.
#[async_trait]
pub trait EventBackend: Clone + Send + Sync + 'static {
    type Session: Session;

    /// Starts a session with an open transaction.
    async fn begin(&self) -> Result<Self::Session, StoreError>;

    /// Creates the stream's storage and uniqueness index. Idempotent.
    async fn ensure_stream(&self, stream: &StreamName) -> Result<(), StoreError>;

    /// Returns the aggregate's events in ascending version order.
    async fn load(
        &self,
        stream: &StreamName,
        aggregate_id: &str,
        session: Option<&mut Self::Session>,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// Inserts one event document.
    async fn insert(
        &self,
        stream: &StreamName,
        record: &EventRecord,
        session: Option<&mut Self::Session>,
    ) -> Result<(), StoreError>;
}

/// One stream of events on one backend.
#[derive(Debug, Clone)]
pub struct EventLog<B: EventBackend> {
    backend: B,
    stream: StreamName,
    ready: Arc<OnceCell<()>>,
}

impl<B: EventBackend> EventLog<B> {
    pub fn new(backend: B, stream: StreamName) -> Self {
        Self {
            backend,
            stream,
            ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn stream(&self) -> &StreamName {
        &self.stream
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Starts a session on the underlying backend.
    pub async fn begin(&self) -> Result<B::Session, StoreError> {
        self.backend.begin().await
    }

    /// Ensures the stream's storage exists. Runs the setup at most once per
    /// log handle (and its clones); a failed setup is retried on next use.
    pub async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.ready
            .get_or_try_init(|| async {
                self.backend.ensure_stream(&self.stream).await?;
                debug!(stream = %self.stream, "event stream ready");
                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(())
    }

    /// Returns all events of `aggregate_id` in ascending version order.
    pub async fn get_events(
        &self,
        aggregate_id: &str,
        session: Option<&mut B::Session>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        self.ensure_ready().await?;
        self.backend.load(&self.stream, aggregate_id, session).await
    }

    /// Appends one event.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionConflict` if the aggregate already has an
    /// event at `record.version`.
    pub async fn append(
        &self,
        record: &EventRecord,
        session: Option<&mut B::Session>,
    ) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        self.backend.insert(&self.stream, record, session).await
    }
}
