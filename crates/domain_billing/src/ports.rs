//! Ledger Store Port
//!
//! The `LedgerStore` trait is everything the orchestration core needs from
//! durable storage. Two adapters implement it:
//!
//! - **PostgreSQL Adapter**: `infra_db::PostgresLedgerStore`
//! - **In-memory Adapter**: [`crate::memory::InMemoryLedgerStore`], for tests
//!   and for running the service without a database
//!
//! # Atomicity
//!
//! Every write method must be atomic on its own. In particular
//! `insert_line_item` inserts the item and bumps the bill total in one
//! transaction, and only while the bill is open, so the stored total always
//! equals the sum of the stored items.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store: Arc<dyn LedgerStore> = match config.ledger_backend {
//!     LedgerBackend::Postgres => Arc::new(PostgresLedgerStore::new(pool)),
//!     LedgerBackend::Memory => Arc::new(InMemoryLedgerStore::new()),
//! };
//! let service = BillingService::new(store, billing_config);
//! ```

use async_trait::async_trait;

use core_kernel::{BillId, DomainPort, HealthCheckable, PortError};

use crate::bill::{Bill, BillStatus, LineItem, NewBill, NewLineItem};

/// Result of an idempotent line item insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItemInsert {
    /// The item was written and the bill total increased
    Inserted(LineItem),
    /// An item with this id already existed; nothing changed
    AlreadyPresent(LineItem),
}

impl LineItemInsert {
    /// The stored line item, whichever way the insert resolved
    pub fn into_item(self) -> LineItem {
        match self {
            LineItemInsert::Inserted(item) | LineItemInsert::AlreadyPresent(item) => item,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, LineItemInsert::AlreadyPresent(_))
    }
}

/// Port for bill and line item persistence
#[async_trait]
pub trait LedgerStore: DomainPort + HealthCheckable {
    /// Inserts the bill row as `Open` with a zero total, or does nothing if
    /// a row with this id exists
    ///
    /// Returns `true` if a row was written.
    async fn insert_bill(&self, bill: &NewBill) -> Result<bool, PortError>;

    /// Reads one bill
    async fn get_bill(&self, id: BillId) -> Result<Option<Bill>, PortError>;

    /// Lists bills, newest first, optionally filtered by status
    async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, PortError>;

    /// Inserts a line item and adds its amount to the bill total atomically
    ///
    /// # Errors
    ///
    /// - `NotFound` if the bill does not exist
    /// - `Conflict` if the bill is closed, the currency differs from the
    ///   bill's, or the item id is already attached to another bill
    async fn insert_line_item(&self, item: &NewLineItem) -> Result<LineItemInsert, PortError>;

    /// Lists a bill's line items by `created_at`, then id
    async fn list_line_items(&self, bill_id: BillId) -> Result<Vec<LineItem>, PortError>;

    /// Marks an open bill closed, provided its stored total is `total_minor`
    ///
    /// Returns `None` if the bill does not exist, is not open, or holds a
    /// different total. The stored total is never overwritten.
    async fn close_bill(&self, id: BillId, total_minor: i64) -> Result<Option<Bill>, PortError>;
}
