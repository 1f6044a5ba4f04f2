//! Aggregate store: replay, validate, append, retry on version conflict.
//!
//! State is never stored. Every [`AggregateStore::apply`] reads the
//! aggregate's full history, folds it from the default state, folds the
//! candidate event on top, validates the transition, and appends the event at
//! the next version. If another writer claimed that version first, the whole
//! cycle runs again against the fresh history.

use std::sync::Arc;
use std::time::Instant;

use aggstore_events::{DomainEvent, EventContext, EventEnvelope, EventRecord};
use aggstore_id::{AggregateVersion, StreamName};
use tracing::{debug, warn};

use crate::log::{EventBackend, EventLog};
use crate::{RetryPolicy, StoreError, ValidationError};

type Reducer<S, E> = dyn Fn(&S, &EventEnvelope<E>) -> S + Send + Sync;
type Validator<S, E> =
    dyn Fn(&S, &EventEnvelope<E>, &S) -> Result<(), ValidationError> + Send + Sync;

/// The behaviour of one aggregate kind: how events fold into state, and
/// which transitions are allowed.
///
/// Both functions must be pure. They run on every `apply` and again on
/// every retry.
pub struct AggregateRules<S, E> {
    reduce: Arc<Reducer<S, E>>,
    validate: Arc<Validator<S, E>>,
}

impl<S, E> Clone for AggregateRules<S, E> {
    fn clone(&self) -> Self {
        Self {
            reduce: Arc::clone(&self.reduce),
            validate: Arc::clone(&self.validate),
        }
    }
}

impl<S, E> AggregateRules<S, E> {
    /// `reduce(state, event)` folds one event; `validate(next, candidate,
    /// previous)` accepts or rejects a candidate.
    pub fn new<R, V>(reduce: R, validate: V) -> Self
    where
        R: Fn(&S, &EventEnvelope<E>) -> S + Send + Sync + 'static,
        V: Fn(&S, &EventEnvelope<E>, &S) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        Self {
            reduce: Arc::new(reduce),
            validate: Arc::new(validate),
        }
    }

    pub fn reduce(&self, state: &S, event: &EventEnvelope<E>) -> S {
        (self.reduce)(state, event)
    }

    pub fn validate(
        &self,
        next: &S,
        candidate: &EventEnvelope<E>,
        previous: &S,
    ) -> Result<(), ValidationError> {
        (self.validate)(next, candidate, previous)
    }

    /// Folds `events` onto `initial` in order.
    pub fn fold<'a>(&self, initial: S, events: impl IntoIterator<Item = &'a EventEnvelope<E>>) -> S
    where
        E: 'a,
    {
        events
            .into_iter()
            .fold(initial, |state, event| self.reduce(&state, event))
    }
}

/// Outcome of one read-compute-validate-write cycle.
enum Attempt<S> {
    Applied(S),
    Conflict(StoreError),
}

/// Event-sourced store for one aggregate kind.
pub struct AggregateStore<B: EventBackend, S, E> {
    log: EventLog<B>,
    default_state: S,
    rules: AggregateRules<S, E>,
    context: EventContext,
    retry: RetryPolicy,
}

impl<B, S, E> AggregateStore<B, S, E>
where
    B: EventBackend,
    S: Clone + Send + Sync + 'static,
    E: DomainEvent,
{
    /// Creates a store writing to `log` with the default retry policy.
    pub fn new(
        log: EventLog<B>,
        default_state: S,
        rules: AggregateRules<S, E>,
        context: EventContext,
    ) -> Self {
        Self {
            log,
            default_state,
            rules,
            context,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn stream(&self) -> &StreamName {
        self.log.stream()
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }

    pub fn log(&self) -> &EventLog<B> {
        &self.log
    }

    /// Starts a session that can be passed to `apply` and `get_events`.
    pub async fn begin(&self) -> Result<B::Session, StoreError> {
        self.log.begin().await
    }

    /// Returns the aggregate's events, decoded, in ascending version order.
    pub async fn get_events(
        &self,
        aggregate_id: &str,
        session: Option<&mut B::Session>,
    ) -> Result<Vec<EventEnvelope<E>>, StoreError> {
        let records = self.log.get_events(aggregate_id, session).await?;
        records
            .iter()
            .map(|record| record.decode().map_err(StoreError::from))
            .collect()
    }

    /// Current state of the aggregate. An aggregate with no events is in the
    /// default state.
    pub async fn load(
        &self,
        aggregate_id: &str,
        session: Option<&mut B::Session>,
    ) -> Result<S, StoreError> {
        let events = self.get_events(aggregate_id, session).await?;
        Ok(self.rules.fold(self.default_state.clone(), &events))
    }

    /// Version of the aggregate's latest event, if it has any.
    pub async fn version(
        &self,
        aggregate_id: &str,
        session: Option<&mut B::Session>,
    ) -> Result<Option<AggregateVersion>, StoreError> {
        let records = self.log.get_events(aggregate_id, session).await?;
        Ok(records.last().map(|record| record.version))
    }

    /// Validates `event` against the aggregate's current state and appends
    /// it at the next version. Returns the state after the event.
    ///
    /// With a session, reads and the write happen inside it and become
    /// visible to others only when the caller commits.
    ///
    /// # Errors
    ///
    /// - `StoreError::Validation` if the validator rejects the transition.
    ///   Never retried.
    /// - `StoreError::RetriesExhausted` if version conflicts outlast the
    ///   retry policy.
    /// - Any other storage error, unretried.
    pub async fn apply(
        &self,
        aggregate_id: &str,
        event: E,
        mut session: Option<&mut B::Session>,
    ) -> Result<S, StoreError> {
        let started = Instant::now();
        let mut retry = 0;

        loop {
            match self
                .attempt(aggregate_id, &event, session.as_deref_mut())
                .await?
            {
                Attempt::Applied(state) => return Ok(state),
                Attempt::Conflict(conflict) => {
                    let elapsed = started.elapsed();
                    let Some(delay) = self.retry.next_delay(retry, elapsed) else {
                        warn!(
                            stream = %self.log.stream(),
                            aggregate_id,
                            attempts = retry + 1,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "version conflict retries exhausted"
                        );
                        return Err(StoreError::RetriesExhausted {
                            attempts: retry + 1,
                            elapsed,
                            source: Box::new(conflict),
                        });
                    };

                    debug!(
                        stream = %self.log.stream(),
                        aggregate_id,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "version conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        aggregate_id: &str,
        event: &E,
        mut session: Option<&mut B::Session>,
    ) -> Result<Attempt<S>, StoreError> {
        let history = self.get_events(aggregate_id, session.as_deref_mut()).await?;

        let version = AggregateVersion::after(history.last().map(|e| e.version)).map_err(|_| {
            StoreError::VersionExhausted {
                stream: self.log.stream().to_string(),
                aggregate_id: aggregate_id.to_string(),
            }
        })?;
        let record = EventRecord::from_event(aggregate_id, version, event, &self.context)?;
        let candidate = record.to_envelope(event.clone());

        let current = self.rules.fold(self.default_state.clone(), &history);
        let next = self.rules.reduce(&current, &candidate);
        self.rules.validate(&next, &candidate, &current)?;

        match self.log.append(&record, session).await {
            Ok(()) => {
                debug!(
                    stream = %self.log.stream(),
                    aggregate_id,
                    version = version.value(),
                    event_type = %record.event_type,
                    "applied event"
                );
                Ok(Attempt::Applied(next))
            }
            Err(err) if err.is_conflict() => Ok(Attempt::Conflict(err)),
            Err(err) => Err(err),
        }
    }
}
