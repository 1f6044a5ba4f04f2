//! Error display for the CLI.

use aggstore_store::StoreError;
use colored::Colorize;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(hint) = err.downcast_ref::<StoreError>().and_then(hint) {
        eprintln!("\n{}", hint.yellow());
    }
}

fn hint(err: &StoreError) -> Option<&'static str> {
    match err {
        StoreError::Connect(_) => Some("Hint: Check DATABASE_URL and that Postgres is running."),
        StoreError::RetriesExhausted { .. } => Some(
            "Hint: The aggregate is under heavy write contention. Retry, or raise AGGSTORE_RETRY_RETRIES.",
        ),
        StoreError::InvalidStream(_) => Some(
            "Hint: Stream names start with a lowercase letter and use only a-z, 0-9 and '_'.",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use aggstore_store::ValidationError;

    use super::*;

    #[test]
    fn validation_errors_have_no_hint() {
        let err = StoreError::from(ValidationError::new("Insufficient funds"));
        assert!(hint(&err).is_none());
    }

    #[test]
    fn exhausted_retries_point_at_retry_budget() {
        let err = StoreError::RetriesExhausted {
            attempts: 6,
            elapsed: std::time::Duration::from_secs(2),
            source: Box::new(StoreError::VersionConflict {
                stream: "bank_account".to_string(),
                aggregate_id: "acct-1".to_string(),
                version: 7,
            }),
        };
        assert!(hint(&err).unwrap().contains("AGGSTORE_RETRY_RETRIES"));
    }
}
