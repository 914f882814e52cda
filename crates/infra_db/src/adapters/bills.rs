//! PostgreSQL Ledger Store
//!
//! Implements the billing domain's `LedgerStore` port on top of
//! [`BillRepository`], translating rows into domain types and database
//! errors into port errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresLedgerStore;
//! use domain_billing::{BillingService, BillingConfig, LedgerStore};
//! use std::sync::Arc;
//!
//! let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(pool));
//! let service = BillingService::new(store, BillingConfig::default());
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    AdapterHealth, BillId, Currency, DomainPort, HealthCheckResult, HealthCheckable, LineItemId,
    PortError,
};
use domain_billing::{
    Bill, BillStatus, LedgerStore, LineItem, LineItemInsert, NewBill, NewLineItem,
};

use crate::error::DatabaseError;
use crate::repositories::bills::{
    BillRepository, BillRow, LineItemRow, LineItemWrite, NewLineItemRow,
};

/// PostgreSQL-backed implementation of the LedgerStore port
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    repository: BillRepository,
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &BillRepository {
        &self.repository
    }
}

impl DomainPort for PostgresLedgerStore {}

#[async_trait]
impl HealthCheckable for PostgresLedgerStore {
    /// Runs `SELECT 1` against the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: "postgres-ledger-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: "postgres-ledger-store".to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip_all, fields(bill_id = %bill.id))]
    async fn insert_bill(&self, bill: &NewBill) -> Result<bool, PortError> {
        Ok(self
            .repository
            .insert_bill(*bill.id.as_uuid(), bill.currency.code())
            .await?)
    }

    async fn get_bill(&self, id: BillId) -> Result<Option<Bill>, PortError> {
        self.repository
            .find_bill(*id.as_uuid())
            .await?
            .map(row_to_bill)
            .transpose()
    }

    async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, PortError> {
        self.repository
            .list_bills(status.as_ref().map(BillStatus::as_str))
            .await?
            .into_iter()
            .map(row_to_bill)
            .collect()
    }

    #[instrument(skip_all, fields(bill_id = %item.bill_id, line_item_id = %item.id))]
    async fn insert_line_item(&self, item: &NewLineItem) -> Result<LineItemInsert, PortError> {
        let row = NewLineItemRow {
            id: *item.id.as_uuid(),
            bill_id: *item.bill_id.as_uuid(),
            description: item.description.clone(),
            amount_minor: item.amount_minor,
            currency: item.currency.code().to_string(),
        };

        match self.repository.insert_line_item(&row).await? {
            LineItemWrite::Inserted(row) => Ok(LineItemInsert::Inserted(row_to_line_item(row))),
            LineItemWrite::Existing(row) => {
                Ok(LineItemInsert::AlreadyPresent(row_to_line_item(row)))
            }
            LineItemWrite::ForeignBill { owner } => Err(PortError::conflict(format!(
                "line item {} belongs to bill {}",
                item.id,
                BillId::from_uuid(owner)
            ))),
            LineItemWrite::BillMissing => Err(PortError::not_found("Bill", item.bill_id)),
            LineItemWrite::BillClosed => {
                Err(PortError::conflict(format!("bill {} is closed", item.bill_id)))
            }
            LineItemWrite::CurrencyMismatch { bill_currency } => Err(PortError::conflict(format!(
                "currency mismatch: bill is {}, line item is {}",
                bill_currency, item.currency
            ))),
        }
    }

    async fn list_line_items(&self, bill_id: BillId) -> Result<Vec<LineItem>, PortError> {
        Ok(self
            .repository
            .list_line_items(*bill_id.as_uuid())
            .await?
            .into_iter()
            .map(row_to_line_item)
            .collect())
    }

    #[instrument(skip_all, fields(bill_id = %id, total_minor = total_minor))]
    async fn close_bill(&self, id: BillId, total_minor: i64) -> Result<Option<Bill>, PortError> {
        self.repository
            .close_bill(*id.as_uuid(), total_minor)
            .await?
            .map(row_to_bill)
            .transpose()
    }
}

/// Converts a bills row to the domain type
fn row_to_bill(row: BillRow) -> Result<Bill, PortError> {
    let status: BillStatus = row.status.parse().map_err(|_| {
        DatabaseError::CorruptRow(format!("bill {} has status '{}'", row.id, row.status))
    })?;
    let currency: Currency = row.currency.parse().map_err(|_| {
        DatabaseError::CorruptRow(format!("bill {} has currency '{}'", row.id, row.currency))
    })?;

    Ok(Bill {
        id: BillId::from_uuid(row.id),
        status,
        currency,
        total_minor: row.total_minor,
        created_at: row.created_at,
        closed_at: row.closed_at,
    })
}

fn row_to_line_item(row: LineItemRow) -> LineItem {
    LineItem {
        id: LineItemId::from_uuid(row.id),
        bill_id: BillId::from_uuid(row.bill_id),
        description: row.description,
        amount_minor: row.amount_minor,
        created_at: row.created_at,
    }
}
