//! # aggstore-store
//!
//! Event-sourced aggregate store with optimistic concurrency.
//!
//! ## Model
//!
//! - Each aggregate kind writes to its own stream; each aggregate within a
//!   stream has a strictly increasing version starting at 1
//! - State is never persisted, only derived by folding the aggregate's events
//! - A write reads the history, validates the candidate transition, and
//!   appends at `latest + 1`; the storage's uniqueness on
//!   `(aggregate_id, version)` decides which concurrent writer wins
//! - Losers re-read and re-validate under a [`RetryPolicy`]
//!
//! ## Example
//!
//! ```ignore
//! let db = Database::connect(&DbConfig::from_env()).await?;
//! let mut registry = StreamRegistry::new(db.backend());
//! registry.register("bank_account")?;
//! registry.init().await?;
//!
//! let accounts = registry.store("bank_account", Account::default(), rules(), context)?;
//! let state = accounts.apply("acct-1", AccountEvent::Deposit(10), None).await?;
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod log;
pub mod registry;
pub mod retry;

pub use aggregate::{AggregateRules, AggregateStore};
pub use config::{Database, DbConfig};
pub use error::{StoreError, ValidationError};
pub use log::{
    EventBackend, EventLog, MemoryBackend, MemorySession, PgBackend, PgSession, Session,
};
pub use registry::StreamRegistry;
pub use retry::RetryPolicy;

pub use aggstore_events::{EventContext, EventEnvelope, EventRecord};
pub use aggstore_id::{AggregateVersion, StreamName};
