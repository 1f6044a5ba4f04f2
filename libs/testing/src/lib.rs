//! # aggstore-testing
//!
//! Reference aggregates and helpers shared by tests and the `aggctl` demo
//! commands.

pub mod bank_account;

use aggstore_events::EventContext;

/// Provenance used by tests that don't care about it.
pub fn test_context() -> EventContext {
    EventContext::new("cor_test", "usr_test", "tnt_test")
}
