//! Activities: the side-effecting steps an orchestrator runs against the store
//!
//! Each activity is idempotent under retry. Transient store failures are
//! retried with backoff; business rejections are returned immediately and
//! mapped onto [`BillingError`].

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use core_kernel::{BillId, Currency, HealthCheckResult};

use crate::bill::{Bill, BillStatus, LineItem, NewBill, NewLineItem};
use crate::error::BillingError;
use crate::ports::{LedgerStore, LineItemInsert};
use crate::retry::{retry_transient, RetryPolicy};

/// Runs store operations with the configured retry policy
#[derive(Clone)]
pub struct ActivityExecutor {
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ActivityExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityExecutor")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ActivityExecutor {
    pub fn new(store: Arc<dyn LedgerStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Inserts the bill row if absent and reads it back
    ///
    /// The read-back is authoritative: a redelivered create sees the row
    /// (and currency) written the first time.
    #[instrument(skip_all, fields(bill_id = %bill_id, currency = %currency))]
    pub async fn create_bill_row(
        &self,
        bill_id: BillId,
        currency: Currency,
    ) -> Result<Bill, BillingError> {
        let new_bill = NewBill { id: bill_id, currency };
        let inserted = retry_transient(&self.retry, "insert_bill", || {
            self.store.insert_bill(&new_bill)
        })
        .await?;
        debug!(inserted, "Bill row ensured");

        self.load_bill(bill_id).await
    }

    /// Validates and inserts one line item, bumping the bill total
    ///
    /// The bill is re-read first so that a closed bill or a currency
    /// mismatch is reported as `FailedPrecondition` even when the store
    /// would also refuse the write.
    #[instrument(skip_all, fields(bill_id = %item.bill_id, line_item_id = %item.id))]
    pub async fn insert_line_item(
        &self,
        item: &NewLineItem,
    ) -> Result<LineItemInsert, BillingError> {
        item.validate()?;

        let bill = self.load_bill(item.bill_id).await?;
        bill.ensure_open()?;
        bill.ensure_currency(item.currency)?;

        let outcome = retry_transient(&self.retry, "insert_line_item", || {
            self.store.insert_line_item(item)
        })
        .await?;

        if outcome.is_duplicate() {
            debug!("Line item already stored, treating as applied");
        }
        Ok(outcome)
    }

    /// Transitions the bill to `Closed` with `total_minor`
    ///
    /// # Errors
    ///
    /// - `NotFound` if the bill does not exist
    /// - `FailedPrecondition` if it was already closed
    /// - `Internal` if the stored total differs from `total_minor`; the bill
    ///   stays open
    #[instrument(skip_all, fields(bill_id = %bill_id, total_minor = total_minor))]
    pub async fn close_bill(&self, bill_id: BillId, total_minor: i64) -> Result<Bill, BillingError> {
        let mut attempts = 0u32;
        let closed = retry_transient(&self.retry, "close_bill", || {
            attempts += 1;
            self.store.close_bill(bill_id, total_minor)
        })
        .await?;

        if let Some(bill) = closed {
            return Ok(bill);
        }

        let bill = self.load_bill(bill_id).await?;
        match bill.status {
            // An earlier attempt of this same call may have committed before
            // its acknowledgment was lost.
            BillStatus::Closed if attempts > 1 && bill.total_minor == total_minor => {
                warn!("Close committed by an earlier attempt");
                Ok(bill)
            }
            BillStatus::Closed => Err(BillingError::FailedPrecondition(format!(
                "bill {} is already closed",
                bill_id
            ))),
            BillStatus::Open if bill.total_minor != total_minor => {
                warn!(stored_total = bill.total_minor, "Close refused, totals differ");
                Err(BillingError::Internal(format!(
                    "bill {} holds total {}, close requested with {}",
                    bill_id, bill.total_minor, total_minor
                )))
            }
            BillStatus::Open => Err(BillingError::Internal(format!(
                "bill {} stayed open after close",
                bill_id
            ))),
        }
    }

    /// Reads a bill; `NotFound` if absent
    pub async fn load_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        retry_transient(&self.retry, "get_bill", || self.store.get_bill(bill_id))
            .await?
            .ok_or_else(|| BillingError::bill_not_found(bill_id))
    }

    /// Reads a bill's line items in stored order
    pub async fn load_line_items(&self, bill_id: BillId) -> Result<Vec<LineItem>, BillingError> {
        Ok(retry_transient(&self.retry, "list_line_items", || {
            self.store.list_line_items(bill_id)
        })
        .await?)
    }

    pub async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, BillingError> {
        Ok(retry_transient(&self.retry, "list_bills", || self.store.list_bills(status)).await?)
    }

    pub async fn health(&self) -> HealthCheckResult {
        self.store.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedgerStore;
    use core_kernel::LineItemId;
    use std::time::Duration;

    fn executor(store: &InMemoryLedgerStore) -> ActivityExecutor {
        let retry = RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(1))
            .build();
        ActivityExecutor::new(Arc::new(store.clone()), retry)
    }

    fn item(bill_id: BillId, amount_minor: i64, currency: Currency) -> NewLineItem {
        NewLineItem {
            id: LineItemId::new_v7(),
            bill_id,
            description: "lunch".to_string(),
            amount_minor,
            currency,
        }
    }

    #[tokio::test]
    async fn test_create_bill_row_reads_back_existing() {
        let store = InMemoryLedgerStore::new();
        let activities = executor(&store);
        let id = BillId::new_v7();

        let first = activities.create_bill_row(id, Currency::GEL).await.unwrap();
        let second = activities.create_bill_row(id, Currency::USD).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.currency, Currency::GEL);
    }

    #[tokio::test]
    async fn test_insert_rejects_currency_mismatch() {
        let store = InMemoryLedgerStore::new();
        let activities = executor(&store);
        let id = BillId::new_v7();
        activities.create_bill_row(id, Currency::USD).await.unwrap();

        let err = activities
            .insert_line_item(&item(id, 100, Currency::GEL))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::FailedPrecondition(_)));
        assert_eq!(store.line_item_count().await, 0);
    }

    #[tokio::test]
    async fn test_insert_retries_lost_ack_without_double_count() {
        let store = InMemoryLedgerStore::new();
        let activities = executor(&store);
        let id = BillId::new_v7();
        activities.create_bill_row(id, Currency::USD).await.unwrap();

        store.inject_lost_acks(1);
        let outcome = activities
            .insert_line_item(&item(id, 725, Currency::USD))
            .await
            .unwrap();

        assert!(outcome.is_duplicate());
        assert_eq!(activities.load_bill(id).await.unwrap().total_minor, 725);
    }

    #[tokio::test]
    async fn test_close_twice_fails() {
        let store = InMemoryLedgerStore::new();
        let activities = executor(&store);
        let id = BillId::new_v7();
        activities.create_bill_row(id, Currency::USD).await.unwrap();

        activities.close_bill(id, 0).await.unwrap();
        let err = activities.close_bill(id, 0).await.unwrap_err();
        assert!(matches!(err, BillingError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_close_survives_lost_ack() {
        let store = InMemoryLedgerStore::new();
        let activities = executor(&store);
        let id = BillId::new_v7();
        activities.create_bill_row(id, Currency::USD).await.unwrap();

        store.inject_lost_acks(1);
        let bill = activities.close_bill(id, 0).await.unwrap();
        assert_eq!(bill.status, BillStatus::Closed);
    }

    #[tokio::test]
    async fn test_close_unknown_bill_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let err = executor(&store).close_bill(BillId::new_v7(), 0).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_close_with_stale_total_leaves_bill_open() {
        let store = InMemoryLedgerStore::new();
        let activities = executor(&store);
        let id = BillId::new_v7();
        activities.create_bill_row(id, Currency::USD).await.unwrap();
        activities
            .insert_line_item(&item(id, 500, Currency::USD))
            .await
            .unwrap();

        let err = activities.close_bill(id, 0).await.unwrap_err();
        assert!(matches!(err, BillingError::Internal(_)));
        assert!(!err.is_definitive());

        let bill = activities.load_bill(id).await.unwrap();
        assert_eq!(bill.status, BillStatus::Open);
        assert_eq!(bill.total_minor, 500);
    }
}
