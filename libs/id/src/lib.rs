//! # aggstore-id
//!
//! Identifier types shared by the aggstore crates.
//!
//! ## ID Format
//!
//! Surrogate event ids use a prefixed format: `{prefix}_{ulid}`, e.g.
//! `evt_01HV4Z2WQXKJNM8GPQY6VBKC3D`. The surrogate id is independent of the
//! aggregate version; ordering within an aggregate comes from
//! [`AggregateVersion`] alone.
//!
//! Stream names partition event logs by aggregate kind and become part of
//! physical table names, so they are validated strictly.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
