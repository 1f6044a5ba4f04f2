//! In-process event backend.
//!
//! Same contract as the Postgres backend: versions are unique per aggregate
//! across committed and staged writes, session writes stay private until
//! commit, and abort (or drop) discards them. Loads yield to the scheduler so concurrent writers interleave the
//! way they would against a real database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aggstore_events::EventRecord;
use aggstore_id::{AggregateVersion, StreamName};
use async_trait::async_trait;

use super::{EventBackend, Session};
use crate::StoreError;

type Aggregates = HashMap<String, Vec<EventRecord>>;

#[derive(Debug, Default)]
struct MemoryState {
    streams: HashMap<StreamName, Aggregates>,
    pending: HashMap<u64, Vec<(StreamName, EventRecord)>>,
    next_session: u64,
}

impl MemoryState {
    fn committed(&self, stream: &StreamName) -> Result<&Aggregates, StoreError> {
        self.streams
            .get(stream)
            .ok_or_else(|| StoreError::UnknownStream(stream.to_string()))
    }

    fn is_taken(&self, stream: &StreamName, aggregate_id: &str, version: AggregateVersion) -> bool {
        self.streams
            .get(stream)
            .and_then(|aggregates| aggregates.get(aggregate_id))
            .is_some_and(|events| events.iter().any(|e| e.version == version))
    }

    /// Whether any open session has staged this version. Mirrors the
    /// Postgres unique index, which also covers uncommitted rows.
    fn is_staged(&self, stream: &StreamName, aggregate_id: &str, version: AggregateVersion) -> bool {
        self.pending.values().flatten().any(|(s, r)| {
            s == stream && r.aggregate_id == aggregate_id && r.version == version
        })
    }
}

fn conflict(stream: &StreamName, record: &EventRecord) -> StoreError {
    StoreError::VersionConflict {
        stream: stream.to_string(),
        aggregate_id: record.aggregate_id.clone(),
        version: record.version.value(),
    }
}

/// Event backend held entirely in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.state)
    }

    /// Number of committed events across every stream.
    pub fn committed_len(&self) -> usize {
        self.lock()
            .streams
            .values()
            .flat_map(|aggregates| aggregates.values())
            .map(Vec::len)
            .sum()
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    // Every critical section leaves the state consistent, so a panic in
    // another holder does not invalidate it.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session over a [`MemoryBackend`].
pub struct MemorySession {
    id: u64,
    state: Arc<Mutex<MemoryState>>,
    finished: bool,
}

impl MemorySession {
    fn discard(&mut self) {
        lock(&self.state).pending.remove(&self.id);
        self.finished = true;
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.finished {
            self.discard();
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn commit(mut self) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        // Staged versions were reserved against every other writer at
        // insert time, so they cannot have been taken since.
        let writes = state.pending.remove(&self.id).unwrap_or_default();

        for (stream, record) in writes {
            state
                .streams
                .entry(stream)
                .or_default()
                .entry(record.aggregate_id.clone())
                .or_default()
                .push(record);
        }
        drop(state);
        self.finished = true;
        Ok(())
    }

    async fn abort(mut self) -> Result<(), StoreError> {
        self.discard();
        Ok(())
    }
}

#[async_trait]
impl EventBackend for MemoryBackend {
    type Session = MemorySession;

    async fn begin(&self) -> Result<MemorySession, StoreError> {
        let mut state = self.lock();
        let id = state.next_session;
        state.next_session += 1;
        state.pending.insert(id, Vec::new());

        Ok(MemorySession {
            id,
            state: Arc::clone(&self.state),
            finished: false,
        })
    }

    async fn ensure_stream(&self, stream: &StreamName) -> Result<(), StoreError> {
        self.lock().streams.entry(stream.clone()).or_default();
        Ok(())
    }

    async fn load(
        &self,
        stream: &StreamName,
        aggregate_id: &str,
        session: Option<&mut MemorySession>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let mut events = {
            let state = self.lock();
            let mut events = state
                .committed(stream)?
                .get(aggregate_id)
                .cloned()
                .unwrap_or_default();

            if let Some(session) = session {
                let staged = state.pending.get(&session.id).into_iter().flatten();
                events.extend(
                    staged
                        .filter(|(s, r)| s == stream && r.aggregate_id == aggregate_id)
                        .map(|(_, r)| r.clone()),
                );
            }
            events
        };
        events.sort_by_key(|e| e.version);

        tokio::task::yield_now().await;
        Ok(events)
    }

    async fn insert(
        &self,
        stream: &StreamName,
        record: &EventRecord,
        session: Option<&mut MemorySession>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.committed(stream)?;

        if state.is_taken(stream, &record.aggregate_id, record.version)
            || state.is_staged(stream, &record.aggregate_id, record.version)
        {
            return Err(conflict(stream, record));
        }

        match session {
            Some(session) => {
                state
                    .pending
                    .entry(session.id)
                    .or_default()
                    .push((stream.clone(), record.clone()));
            }
            None => {
                state
                    .streams
                    .entry(stream.clone())
                    .or_default()
                    .entry(record.aggregate_id.clone())
                    .or_default()
                    .push(record.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aggstore_events::EventContext;
    use serde_json::json;

    use super::*;

    fn stream() -> StreamName {
        StreamName::parse("ledger").unwrap()
    }

    fn record(aggregate_id: &str, version: i32) -> EventRecord {
        EventRecord::new(
            aggregate_id,
            AggregateVersion::new(version).unwrap(),
            "deposit",
            json!(1),
            &EventContext::new("cor", "usr", "tnt"),
        )
    }

    async fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.ensure_stream(&stream()).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_duplicate_version_conflicts() {
        let backend = backend().await;
        backend.insert(&stream(), &record("a", 1), None).await.unwrap();

        let err = backend
            .insert(&stream(), &record("a", 1), None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // Same version on another aggregate is fine.
        backend.insert(&stream(), &record("b", 1), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_sorted_by_version() {
        let backend = backend().await;
        backend.insert(&stream(), &record("a", 2), None).await.unwrap();
        backend.insert(&stream(), &record("a", 1), None).await.unwrap();

        let events = backend.load(&stream(), "a", None).await.unwrap();
        let versions: Vec<i32> = events.iter().map(|e| e.version.value()).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_insert_requires_stream() {
        let backend = MemoryBackend::new();
        let err = backend
            .insert(&stream(), &record("a", 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownStream(_)));
    }

    #[tokio::test]
    async fn test_session_isolation_and_commit() {
        let backend = backend().await;
        let mut session = backend.begin().await.unwrap();
        backend
            .insert(&stream(), &record("a", 1), Some(&mut session))
            .await
            .unwrap();

        assert!(backend.load(&stream(), "a", None).await.unwrap().is_empty());
        assert_eq!(
            backend
                .load(&stream(), "a", Some(&mut session))
                .await
                .unwrap()
                .len(),
            1
        );

        session.commit().await.unwrap();
        assert_eq!(backend.load(&stream(), "a", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_do_not_see_each_other() {
        let backend = backend().await;
        let mut first = backend.begin().await.unwrap();
        let mut second = backend.begin().await.unwrap();

        backend
            .insert(&stream(), &record("a", 1), Some(&mut first))
            .await
            .unwrap();
        assert!(backend
            .load(&stream(), "a", Some(&mut second))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_abort_and_drop_discard_writes() {
        let backend = backend().await;

        let mut aborted = backend.begin().await.unwrap();
        backend
            .insert(&stream(), &record("a", 1), Some(&mut aborted))
            .await
            .unwrap();
        aborted.abort().await.unwrap();

        {
            let mut dropped = backend.begin().await.unwrap();
            backend
                .insert(&stream(), &record("a", 1), Some(&mut dropped))
                .await
                .unwrap();
        }

        assert!(backend.load(&stream(), "a", None).await.unwrap().is_empty());
        assert_eq!(backend.committed_len(), 0);
    }

    #[tokio::test]
    async fn test_staged_version_blocks_other_writers() {
        let backend = backend().await;
        let mut session = backend.begin().await.unwrap();
        backend
            .insert(&stream(), &record("a", 1), Some(&mut session))
            .await
            .unwrap();

        let err = backend
            .insert(&stream(), &record("a", 1), None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let mut other = backend.begin().await.unwrap();
        let err = backend
            .insert(&stream(), &record("a", 1), Some(&mut other))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let events = backend.load(&stream(), "a", Some(&mut session)).await.unwrap();
        let versions: Vec<i32> = events.iter().map(|e| e.version.value()).collect();
        assert_eq!(versions, vec![1]);

        session.commit().await.unwrap();
        assert_eq!(backend.committed_len(), 1);
    }

    #[tokio::test]
    async fn test_aborted_session_releases_staged_version() {
        let backend = backend().await;
        let mut session = backend.begin().await.unwrap();
        backend
            .insert(&stream(), &record("a", 1), Some(&mut session))
            .await
            .unwrap();
        session.abort().await.unwrap();

        backend.insert(&stream(), &record("a", 1), None).await.unwrap();
        assert_eq!(backend.committed_len(), 1);
    }
}
