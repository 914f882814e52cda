//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data and fully wired services backed by the
//! in-memory ledger store. Retry delays and acknowledgment deadlines are
//! shortened so failure-path tests stay fast.

use std::sync::Arc;
use std::time::Duration;

use core_kernel::{BillId, Currency, LineItemId, Money};
use domain_billing::{
    BillingConfig, BillingService, InMemoryLedgerStore, MailboxConfig, RetryPolicy, SubmitLineItem,
};

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// $12.50
    pub fn usd_1250() -> Money {
        Money::from_minor(1250, Currency::USD)
    }

    /// $7.25
    pub fn usd_725() -> Money {
        Money::from_minor(725, Currency::USD)
    }

    pub fn usd_zero() -> Money {
        Money::zero(Currency::USD)
    }

    /// ₾ 30.00, for currency mismatch tests
    pub fn gel_3000() -> Money {
        Money::from_minor(3000, Currency::GEL)
    }
}

/// Fixture for identifiers with fixed values
pub struct IdFixtures;

impl IdFixtures {
    pub fn bill_id() -> BillId {
        BillId::from_uuid(uuid::Uuid::from_u128(0x0191_0000_0000_7000_8000_0000_0000_0001))
    }

    pub fn line_item_id() -> LineItemId {
        LineItemId::from_uuid(uuid::Uuid::from_u128(0x0191_0000_0000_7000_8000_0000_0000_0002))
    }
}

/// Fixture for service configuration
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Millisecond retry delays with the default retry count
    pub fn fast_retry() -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(10))
            .build()
    }

    pub fn billing_config() -> BillingConfig {
        BillingConfig {
            mailbox: MailboxConfig {
                capacity: 16,
                ack_timeout: Duration::from_secs(5),
            },
            retry: Self::fast_retry(),
        }
    }

    /// Acknowledgment deadline shorter than any store call under latency
    pub fn impatient_config(ack_timeout: Duration) -> BillingConfig {
        BillingConfig {
            mailbox: MailboxConfig {
                capacity: 16,
                ack_timeout,
            },
            retry: Self::fast_retry(),
        }
    }
}

/// Creates a service over a fresh in-memory store
///
/// The returned store shares state with the one inside the service, so tests
/// can inject faults and inspect rows directly.
pub fn memory_service() -> (InMemoryLedgerStore, BillingService) {
    let store = InMemoryLedgerStore::new();
    let service = service_over(&store);
    (store, service)
}

/// Creates a second service over an existing store, as after a restart
pub fn service_over(store: &InMemoryLedgerStore) -> BillingService {
    BillingService::new(Arc::new(store.clone()), ConfigFixtures::billing_config())
}

/// A line item request with a generated idempotency key
pub fn line_item(description: &str, amount_minor: i64, currency: &str) -> SubmitLineItem {
    SubmitLineItem {
        line_item_id: Some(LineItemId::new_v7()),
        description: description.to_string(),
        amount_minor,
        currency: currency.to_string(),
    }
}
