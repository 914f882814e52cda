//! Billing service: the entry point for callers
//!
//! Validates requests before they reach an orchestrator, routes commands
//! through the [`BillMailbox`], and serves reads straight from the store.

use std::sync::Arc;

use tracing::{info, instrument};

use core_kernel::{BillId, Currency, HealthCheckResult, LineItemId};

use crate::activities::ActivityExecutor;
use crate::bill::{validate_line_item_input, Bill, BillSnapshot, BillStatus, LineItem};
use crate::command::AddLineItem;
use crate::error::BillingError;
use crate::mailbox::{BillMailbox, MailboxConfig};
use crate::ports::LedgerStore;
use crate::retry::RetryPolicy;

/// Tuning for the orchestration core
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillingConfig {
    pub mailbox: MailboxConfig,
    pub retry: RetryPolicy,
}

/// Request to append a line item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitLineItem {
    /// Idempotency key; generated when absent
    pub line_item_id: Option<LineItemId>,
    pub description: String,
    pub amount_minor: i64,
    /// ISO code as supplied by the caller
    pub currency: String,
}

#[derive(Debug)]
pub struct BillingService {
    activities: ActivityExecutor,
    mailbox: BillMailbox,
}

impl BillingService {
    pub fn new(store: Arc<dyn LedgerStore>, config: BillingConfig) -> Self {
        let activities = ActivityExecutor::new(store, config.retry);
        let mailbox = BillMailbox::new(activities.clone(), config.mailbox);
        Self { activities, mailbox }
    }

    pub fn mailbox(&self) -> &BillMailbox {
        &self.mailbox
    }

    /// Creates an open bill and starts its orchestrator
    ///
    /// With an explicit `bill_id` the call is idempotent: repeating it
    /// returns the existing bill.
    #[instrument(skip(self))]
    pub async fn create_bill(
        &self,
        currency: &str,
        bill_id: Option<BillId>,
    ) -> Result<Bill, BillingError> {
        let currency: Currency = currency.parse()?;
        let bill_id = bill_id.unwrap_or_else(BillId::new_v7);

        let bill = self.mailbox.open(bill_id, currency).await?;
        info!(bill_id = %bill.id, currency = %bill.currency, "Bill created");
        Ok(bill)
    }

    /// Validates and enqueues a line item, waiting for its acknowledgment
    #[instrument(skip(self, request), fields(bill_id = %bill_id))]
    pub async fn submit_add_line_item(
        &self,
        bill_id: BillId,
        request: SubmitLineItem,
    ) -> Result<LineItem, BillingError> {
        let currency: Currency = request.currency.parse()?;
        validate_line_item_input(&request.description, request.amount_minor)?;

        let bill = self.activities.load_bill(bill_id).await?;
        bill.ensure_open()?;
        bill.ensure_currency(currency)?;

        let item = AddLineItem {
            line_item_id: request.line_item_id.unwrap_or_else(LineItemId::new_v7),
            description: request.description,
            amount_minor: request.amount_minor,
            currency,
        };
        self.mailbox.add_line_item(bill_id, item).await
    }

    /// Requests the bill be closed and returns the final snapshot
    #[instrument(skip(self))]
    pub async fn submit_close(&self, bill_id: BillId) -> Result<BillSnapshot, BillingError> {
        let bill = self.activities.load_bill(bill_id).await?;
        bill.ensure_open()?;

        self.mailbox.close(bill_id).await
    }

    /// Reads a bill and its items
    pub async fn get_bill(&self, bill_id: BillId) -> Result<BillSnapshot, BillingError> {
        let bill = self.activities.load_bill(bill_id).await?;
        let items = self.activities.load_line_items(bill_id).await?;
        Ok(BillSnapshot { bill, items })
    }

    /// Lists bills newest first, optionally filtered by status
    pub async fn list_bills(&self, status: Option<BillStatus>) -> Result<Vec<Bill>, BillingError> {
        self.activities.list_bills(status).await
    }

    /// Restarts orchestrators for open bills after a process restart
    pub async fn recover(&self) -> Result<usize, BillingError> {
        self.mailbox.recover_open_bills().await
    }

    pub async fn health(&self) -> HealthCheckResult {
        self.activities.health().await
    }
}
