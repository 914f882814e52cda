//! In-memory ledger store
//!
//! Backs the service when no database is configured and drives the
//! orchestration tests. Besides plain storage it can inject transient
//! failures, either before a call touches state or after a write has been
//! applied (a lost acknowledgment), which is how crash-and-retry paths are
//! exercised without a real database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use core_kernel::{
    AdapterHealth, BillId, DomainPort, HealthCheckResult, HealthCheckable, LineItemId, PortError,
};

use crate::bill::{Bill, BillStatus, LineItem, NewBill, NewLineItem};
use crate::ports::{LedgerStore, LineItemInsert};

#[derive(Debug, Default)]
struct Tables {
    bills: HashMap<BillId, Bill>,
    items: HashMap<LineItemId, LineItem>,
}

/// In-memory implementation of [`LedgerStore`]
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
    failures: Arc<AtomicU32>,
    lost_acks: Arc<AtomicU32>,
    latency_ms: Arc<AtomicU64>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls fail with a connection error before
    /// touching any state
    pub fn inject_failures(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` writes apply their change and then report a
    /// connection error
    pub fn inject_lost_acks(&self, count: u32) {
        self.lost_acks.store(count, Ordering::SeqCst);
    }

    /// Delays every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of stored line items across all bills
    pub async fn line_item_count(&self) -> usize {
        self.tables.read().await.items.len()
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn before_call(&self, operation: &str) -> Result<(), PortError> {
        let latency_ms = self.latency_ms.load(Ordering::SeqCst);
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }
        if Self::take(&self.failures) {
            return Err(PortError::connection(format!(
                "injected failure before {}",
                operation
            )));
        }
        Ok(())
    }

    fn after_write<T>(&self, operation: &str, result: T) -> Result<T, PortError> {
        if Self::take(&self.lost_acks) {
            return Err(PortError::connection(format!(
                "injected lost acknowledgment after {}",
                operation
            )));
        }
        Ok(result)
    }
}

impl DomainPort for InMemoryLedgerStore {}

#[async_trait]
impl HealthCheckable for InMemoryLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "memory-ledger-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some("In-memory store, state is lost on restart".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_bill(&self, bill: &NewBill) -> Result<bool, PortError> {
        self.before_call("insert_bill").await?;
        let inserted = {
            let mut tables = self.tables.write().await;
            if tables.bills.contains_key(&bill.id) {
                false
            } else {
                tables.bills.insert(
                    bill.id,
                    Bill {
                        id: bill.id,
                        status: BillStatus::Open,
                        currency: bill.currency,
                        total_minor: 0,
                        created_at: Utc::now(),
                        closed_at: None,
                    },
                );
                true
            }
        };
        self.after_write("insert_bill", inserted)
    }

    async fn get_bill(&self, id: BillId) -> Result<Option<Bill>, PortError> {
        self.before_call("get_bill").await?;
        Ok(self.tables.read().await.bills.get(&id).cloned())
    }

    async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, PortError> {
        self.before_call("list_bills").await?;
        let tables = self.tables.read().await;
        let mut bills: Vec<Bill> = tables
            .bills
            .values()
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        bills.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bills)
    }

    async fn insert_line_item(&self, item: &NewLineItem) -> Result<LineItemInsert, PortError> {
        self.before_call("insert_line_item").await?;
        let outcome = {
            let mut tables = self.tables.write().await;

            if let Some(existing) = tables.items.get(&item.id) {
                if existing.bill_id != item.bill_id {
                    return Err(PortError::conflict(format!(
                        "line item {} belongs to bill {}",
                        item.id, existing.bill_id
                    )));
                }
                return Ok(LineItemInsert::AlreadyPresent(existing.clone()));
            }

            let bill = tables
                .bills
                .get_mut(&item.bill_id)
                .ok_or_else(|| PortError::not_found("Bill", item.bill_id))?;
            if bill.status != BillStatus::Open {
                return Err(PortError::conflict(format!("bill {} is closed", item.bill_id)));
            }
            if bill.currency != item.currency {
                return Err(PortError::conflict(format!(
                    "currency mismatch: bill is {}, line item is {}",
                    bill.currency, item.currency
                )));
            }
            bill.total_minor = bill
                .total_minor
                .checked_add(item.amount_minor)
                .ok_or_else(|| PortError::validation("bill total overflow"))?;

            let stored = LineItem {
                id: item.id,
                bill_id: item.bill_id,
                description: item.description.clone(),
                amount_minor: item.amount_minor,
                created_at: Utc::now(),
            };
            tables.items.insert(stored.id, stored.clone());
            LineItemInsert::Inserted(stored)
        };
        self.after_write("insert_line_item", outcome)
    }

    async fn list_line_items(&self, bill_id: BillId) -> Result<Vec<LineItem>, PortError> {
        self.before_call("list_line_items").await?;
        let tables = self.tables.read().await;
        let mut items: Vec<LineItem> = tables
            .items
            .values()
            .filter(|i| i.bill_id == bill_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn close_bill(&self, id: BillId, total_minor: i64) -> Result<Option<Bill>, PortError> {
        self.before_call("close_bill").await?;
        let closed = {
            let mut tables = self.tables.write().await;
            match tables.bills.get_mut(&id) {
                Some(bill) if bill.status == BillStatus::Open && bill.total_minor == total_minor => {
                    bill.status = BillStatus::Closed;
                    bill.closed_at = Some(Utc::now());
                    Some(bill.clone())
                }
                _ => None,
            }
        };
        self.after_write("close_bill", closed)
    }
}
