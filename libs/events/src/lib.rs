//! # aggstore-events
//!
//! The persisted event document and the typed view over it.
//!
//! ## Design Principles
//!
//! - Events are immutable once appended; nothing here updates or deletes them
//! - Every event belongs to exactly one aggregate and carries its version
//! - Every event carries the provenance (tenant, principal, correlation) of
//!   the store instance that wrote it
//! - Payloads are stored as JSON and interpreted only by the aggregate's
//!   reducer and validator
//!
//! ## Event Shape
//!
//! Domain events are enums serialized adjacently tagged, so each variant maps
//! to a `type` string and a `payload` value:
//!
//! ```ignore
//! #[derive(Clone, Serialize, Deserialize)]
//! #[serde(tag = "type", content = "payload")]
//! enum AccountEvent {
//!     #[serde(rename = "deposit")]
//!     Deposit(u64),
//!     #[serde(rename = "withdrawal")]
//!     Withdrawal(u64),
//! }
//! ```

mod codec;
mod envelope;
mod error;

pub use codec::{decode_event, encode_event, DomainEvent};
pub use envelope::*;
pub use error::EventError;
