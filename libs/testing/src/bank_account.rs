//! Bank account: the reference aggregate.
//!
//! Balance is the sum of deposits minus withdrawals. Deposits and
//! withdrawals must be positive and the balance can never go negative.

use aggstore_events::{EventContext, EventEnvelope};
use aggstore_store::{
    AggregateRules, AggregateStore, EventBackend, EventLog, MemoryBackend, StoreError,
    StreamName, StreamRegistry, ValidationError,
};
use serde::{Deserialize, Serialize};

/// Stream the accounts are stored in.
pub const STREAM: &str = "bank_account";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum AccountEvent {
    #[serde(rename = "deposit")]
    Deposit(i64),
    #[serde(rename = "withdrawal")]
    Withdrawal(i64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: i64,
}

pub type AccountStore<B> = AggregateStore<B, Account, AccountEvent>;

fn reduce(state: &Account, event: &EventEnvelope<AccountEvent>) -> Account {
    match event.event {
        AccountEvent::Deposit(amount) => Account {
            balance: state.balance.saturating_add(amount),
        },
        AccountEvent::Withdrawal(amount) => Account {
            balance: state.balance.saturating_sub(amount),
        },
    }
}

fn validate(
    next: &Account,
    candidate: &EventEnvelope<AccountEvent>,
    previous: &Account,
) -> Result<(), ValidationError> {
    match candidate.event {
        AccountEvent::Deposit(amount) if amount <= 0 => Err(ValidationError::new(
            "Deposit amount must be greater than 0",
        )),
        AccountEvent::Withdrawal(amount) if amount <= 0 => Err(ValidationError::new(
            "Withdrawal amount must be greater than 0",
        )),
        AccountEvent::Deposit(amount) if previous.balance.checked_add(amount).is_none() => {
            Err(ValidationError::new(format!(
                "Deposit of {amount} would overflow balance {}",
                previous.balance
            )))
        }
        AccountEvent::Withdrawal(amount) if previous.balance.checked_sub(amount).is_none() => {
            Err(ValidationError::new(format!(
                "Withdrawal of {amount} would overflow balance {}",
                previous.balance
            )))
        }
        AccountEvent::Withdrawal(amount) if next.balance < 0 => {
            Err(ValidationError::new(format!(
                "Insufficient funds: balance is {}, cannot withdraw {amount}",
                previous.balance
            )))
        }
        _ => Ok(()),
    }
}

pub fn rules() -> AggregateRules<Account, AccountEvent> {
    AggregateRules::new(reduce, validate)
}

/// Account store over an existing log.
pub fn store<B: EventBackend>(log: EventLog<B>, context: EventContext) -> AccountStore<B> {
    AggregateStore::new(log, Account::default(), rules(), context)
}

/// Account store on a registry that already has [`STREAM`] registered.
pub fn from_registry<B: EventBackend>(
    registry: &StreamRegistry<B>,
    context: EventContext,
) -> Result<AccountStore<B>, StoreError> {
    registry.store(STREAM, Account::default(), rules(), context)
}

/// Account store on a fresh in-memory backend.
pub fn memory_store() -> AccountStore<MemoryBackend> {
    let stream = StreamName::parse(STREAM).unwrap_or_else(|e| panic!("invalid stream: {e}"));
    store(
        EventLog::new(MemoryBackend::new(), stream),
        crate::test_context(),
    )
}

#[cfg(test)]
mod tests {
    use aggstore_events::{encode_event, EventRecord};
    use aggstore_store::AggregateVersion;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn envelope(version: i32, event: AccountEvent) -> EventEnvelope<AccountEvent> {
        EventRecord::from_event(
            "acct",
            AggregateVersion::new(version).unwrap(),
            &event,
            &crate::test_context(),
        )
        .unwrap()
        .to_envelope(event)
    }

    #[test]
    fn test_event_encoding() {
        let (event_type, payload) = encode_event(&AccountEvent::Withdrawal(7)).unwrap();
        assert_eq!(event_type, "withdrawal");
        assert_eq!(payload, json!(7));
    }

    #[rstest]
    #[case(AccountEvent::Deposit(0), "Deposit amount must be greater than 0")]
    #[case(AccountEvent::Deposit(-3), "Deposit amount must be greater than 0")]
    #[case(AccountEvent::Withdrawal(0), "Withdrawal amount must be greater than 0")]
    #[case(AccountEvent::Withdrawal(11), "Insufficient funds: balance is 10, cannot withdraw 11")]
    fn test_rejected_transitions(#[case] event: AccountEvent, #[case] message: &str) {
        let previous = Account { balance: 10 };
        let candidate = envelope(2, event);
        let next = reduce(&previous, &candidate);

        let err = validate(&next, &candidate, &previous).unwrap_err();
        assert_eq!(err.message(), message);
    }

    #[rstest]
    #[case(AccountEvent::Deposit(1), 11)]
    #[case(AccountEvent::Withdrawal(10), 0)]
    fn test_accepted_transitions(#[case] event: AccountEvent, #[case] balance: i64) {
        let previous = Account { balance: 10 };
        let candidate = envelope(2, event);
        let next = reduce(&previous, &candidate);

        assert!(validate(&next, &candidate, &previous).is_ok());
        assert_eq!(next.balance, balance);
    }

    #[test]
    fn test_saturating_reduce_is_rejected() {
        let previous = Account { balance: i64::MAX };
        let candidate = envelope(2, AccountEvent::Deposit(1));
        let next = reduce(&previous, &candidate);

        assert_eq!(next.balance, i64::MAX);
        let err = validate(&next, &candidate, &previous).unwrap_err();
        assert!(err.message().contains("would overflow"), "{err}");
    }

    #[tokio::test]
    async fn test_overflowing_deposit_is_rejected() {
        let accounts = memory_store();
        accounts
            .apply("acct-1", AccountEvent::Deposit(i64::MAX), None)
            .await
            .unwrap();

        let err = accounts
            .apply("acct-1", AccountEvent::Deposit(i64::MAX), None)
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err}");
        assert_eq!(accounts.get_events("acct-1", None).await.unwrap().len(), 1);
        assert_eq!(
            accounts.load("acct-1", None).await.unwrap(),
            Account { balance: i64::MAX }
        );
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let accounts = memory_store();
        accounts
            .apply("acct-1", AccountEvent::Deposit(5), None)
            .await
            .unwrap();
        let state = accounts
            .apply("acct-1", AccountEvent::Withdrawal(2), None)
            .await
            .unwrap();
        assert_eq!(state, Account { balance: 3 });
        assert_eq!(accounts.load("acct-1", None).await.unwrap(), state);
    }
}
