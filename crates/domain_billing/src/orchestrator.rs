//! Per-bill orchestrator
//!
//! One orchestrator task owns each open bill. It drains the bill's command
//! channel one message at a time, so the running total has a single writer
//! and no locking is needed around it. Durable effects go through the
//! [`ActivityExecutor`]; the in-memory [`OrchestratorState`] is rebuilt from
//! the store whenever an orchestrator is restarted.
//!
//! # Lifecycle
//!
//! ```text
//!   start / recover ──► run: AddLineItem* ──► Close ──► terminated
//!                                   │                     │
//!                                   └── store error ──────┘ (bill stays open,
//!                                        reply Internal      actor keeps running)
//! ```
//!
//! After a store error with an unknown outcome the state is marked stale and
//! rebuilt from the store before the next command touches it, so a write
//! that committed without acknowledgment is still counted before close.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use core_kernel::{BillId, Currency, LineItemId, Money};

use crate::activities::ActivityExecutor;
use crate::bill::{Bill, BillSnapshot, LineItem, NewLineItem};
use crate::command::{AddLineItem, BillCommand};
use crate::error::BillingError;

/// Replayable in-memory view of one open bill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorState {
    bill_id: BillId,
    currency: Currency,
    running_total: Money,
    items: Vec<LineItem>,
    applied: HashSet<LineItemId>,
}

impl OrchestratorState {
    pub fn new(bill_id: BillId, currency: Currency) -> Self {
        Self {
            bill_id,
            currency,
            running_total: Money::zero(currency),
            items: Vec::new(),
            applied: HashSet::new(),
        }
    }

    /// Rebuilds state from a bill row and its stored items
    ///
    /// Replaying the same inputs always yields the same state; duplicate
    /// item ids are counted once.
    pub fn replay<I>(bill: &Bill, items: I) -> Result<Self, BillingError>
    where
        I: IntoIterator<Item = LineItem>,
    {
        let mut state = Self::new(bill.id, bill.currency);
        for item in items {
            state.apply(item)?;
        }
        Ok(state)
    }

    /// Folds a stored line item into the state
    ///
    /// Returns `false` if the item was already applied.
    pub fn apply(&mut self, item: LineItem) -> Result<bool, BillingError> {
        if item.bill_id != self.bill_id {
            return Err(BillingError::Internal(format!(
                "line item {} belongs to bill {}, not {}",
                item.id, item.bill_id, self.bill_id
            )));
        }
        if self.applied.contains(&item.id) {
            return Ok(false);
        }

        self.running_total = self
            .running_total
            .checked_add(&item.amount(self.currency))?;
        self.applied.insert(item.id);

        // Keep the store's listing order: created_at, then id.
        let position = self
            .items
            .partition_point(|existing| (existing.created_at, existing.id) <= (item.created_at, item.id));
        self.items.insert(position, item);
        Ok(true)
    }

    pub fn bill_id(&self) -> BillId {
        self.bill_id
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn running_total(&self) -> Money {
        self.running_total
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn get(&self, id: LineItemId) -> Option<&LineItem> {
        if self.applied.contains(&id) {
            self.items.iter().find(|item| item.id == id)
        } else {
            None
        }
    }
}

/// How [`BillOrchestrator::start`] resolved
#[derive(Debug)]
pub enum Startup {
    /// The bill is open and its orchestrator is ready to run
    Ready {
        orchestrator: BillOrchestrator,
        bill: Bill,
    },
    /// The bill already existed and is closed; no orchestrator was started
    Closed(Bill),
}

/// Single-writer owner of one bill's state
#[derive(Debug)]
pub struct BillOrchestrator {
    state: OrchestratorState,
    activities: ActivityExecutor,
    commands: mpsc::Receiver<BillCommand>,
    stale: bool,
}

impl BillOrchestrator {
    /// Creates the bill row if needed and prepares an orchestrator for it
    ///
    /// A redelivered start for an existing open bill replays its items. A
    /// currency differing from the existing row's is `FailedPrecondition`.
    pub async fn start(
        bill_id: BillId,
        currency: Currency,
        activities: ActivityExecutor,
        commands: mpsc::Receiver<BillCommand>,
    ) -> Result<Startup, BillingError> {
        let bill = activities.create_bill_row(bill_id, currency).await?;
        if bill.currency != currency {
            return Err(BillingError::FailedPrecondition(format!(
                "bill {} already exists with currency {}",
                bill_id, bill.currency
            )));
        }
        if !bill.is_open() {
            return Ok(Startup::Closed(bill));
        }

        let orchestrator = Self::recover(bill.clone(), activities, commands).await?;
        Ok(Startup::Ready { orchestrator, bill })
    }

    /// Rebuilds an orchestrator for an existing open bill from the store
    pub async fn recover(
        bill: Bill,
        activities: ActivityExecutor,
        commands: mpsc::Receiver<BillCommand>,
    ) -> Result<Self, BillingError> {
        bill.ensure_open()?;

        let items = activities.load_line_items(bill.id).await?;
        let replayed = items.len();
        let state = OrchestratorState::replay(&bill, items)?;

        if state.running_total().amount_minor() != bill.total_minor {
            warn!(
                bill_id = %bill.id,
                stored_total = bill.total_minor,
                replayed_total = state.running_total().amount_minor(),
                "Stored total differs from replayed items"
            );
        }
        debug!(bill_id = %bill.id, replayed, "Orchestrator state rebuilt");

        Ok(Self {
            state,
            activities,
            commands,
            stale: false,
        })
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    /// Processes commands until the bill closes or every sender is dropped
    ///
    /// Returns the final snapshot if the bill was closed by this run.
    pub async fn run(mut self) -> Option<BillSnapshot> {
        let bill_id = self.state.bill_id();
        info!(bill_id = %bill_id, "Bill orchestrator running");

        while let Some(command) = self.commands.recv().await {
            debug!(bill_id = %bill_id, command = command.kind(), "Processing command");
            match command {
                BillCommand::AddLineItem { item, resp } => {
                    let result = self.handle_add_line_item(item).await;
                    let _ = resp.send(result);
                }
                BillCommand::Close { resp } => match self.handle_close().await {
                    Ok(snapshot) => {
                        self.shutdown();
                        let _ = resp.send(Ok(snapshot.clone()));
                        return Some(snapshot);
                    }
                    Err(err) if err.is_definitive() => {
                        warn!(bill_id = %bill_id, error = %err, "Close rejected, stopping orchestrator");
                        let _ = resp.send(Err(err));
                        self.shutdown();
                        return None;
                    }
                    Err(err) => {
                        error!(bill_id = %bill_id, error = %err, "Close failed, bill stays open");
                        self.stale = true;
                        let _ = resp.send(Err(err));
                    }
                },
            }
        }

        debug!(bill_id = %bill_id, "Command channel closed, orchestrator exiting");
        None
    }

    async fn handle_add_line_item(&mut self, command: AddLineItem) -> Result<LineItem, BillingError> {
        if command.currency != self.state.currency() {
            return Err(BillingError::currency_mismatch(
                self.state.currency(),
                command.currency,
            ));
        }
        self.ensure_synced().await?;
        if let Some(existing) = self.state.get(command.line_item_id) {
            debug!(line_item_id = %command.line_item_id, "Redelivered line item, already applied");
            return Ok(existing.clone());
        }

        let new_item = NewLineItem {
            id: command.line_item_id,
            bill_id: self.state.bill_id(),
            description: command.description,
            amount_minor: command.amount_minor,
            currency: command.currency,
        };
        let stored = match self.activities.insert_line_item(&new_item).await {
            Ok(outcome) => outcome.into_item(),
            Err(err) if err.is_definitive() => return Err(err),
            Err(err) => return self.reconcile_failed_insert(new_item.id, err).await,
        };
        self.state.apply(stored.clone())?;

        info!(
            bill_id = %self.state.bill_id(),
            line_item_id = %stored.id,
            amount_minor = stored.amount_minor,
            running_total = self.state.running_total().amount_minor(),
            "Line item added"
        );
        Ok(stored)
    }

    /// Resolves an insert whose outcome is unknown
    ///
    /// The write may have committed. The state is rebuilt from the store; if
    /// the item is there it is reported as added, otherwise the original
    /// error is returned.
    async fn reconcile_failed_insert(
        &mut self,
        line_item_id: LineItemId,
        err: BillingError,
    ) -> Result<LineItem, BillingError> {
        self.stale = true;
        if let Err(resync_err) = self.resync().await {
            warn!(
                bill_id = %self.state.bill_id(),
                error = %resync_err,
                "Resync after failed insert failed, state stays stale"
            );
            return Err(err);
        }

        match self.state.get(line_item_id) {
            Some(item) => {
                warn!(line_item_id = %line_item_id, "Insert committed despite error, counting it");
                Ok(item.clone())
            }
            None => Err(err),
        }
    }

    async fn ensure_synced(&mut self) -> Result<(), BillingError> {
        if self.stale {
            self.resync().await?;
        }
        Ok(())
    }

    /// Replaces the in-memory state with a replay of the stored items
    async fn resync(&mut self) -> Result<(), BillingError> {
        let bill_id = self.state.bill_id();
        let bill = self.activities.load_bill(bill_id).await?;
        let items = self.activities.load_line_items(bill_id).await?;
        self.state = OrchestratorState::replay(&bill, items)?;
        self.stale = false;

        info!(
            bill_id = %bill_id,
            running_total = self.state.running_total().amount_minor(),
            "Orchestrator state rebuilt from store"
        );
        Ok(())
    }

    async fn handle_close(&mut self) -> Result<BillSnapshot, BillingError> {
        self.ensure_synced().await?;
        let total = self.state.running_total().amount_minor();
        let bill = self.activities.close_bill(self.state.bill_id(), total).await?;

        if bill.total_minor != total {
            error!(
                bill_id = %bill.id,
                stored_total = bill.total_minor,
                expected_total = total,
                "Closed bill total differs from running total"
            );
        }
        info!(
            bill_id = %bill.id,
            total_minor = bill.total_minor,
            items = self.state.items().len(),
            "Bill closed"
        );

        Ok(BillSnapshot {
            bill,
            items: self.state.items().to_vec(),
        })
    }

    /// Stops accepting commands and rejects whatever is still queued
    fn shutdown(&mut self) {
        let bill_id = self.state.bill_id();
        self.commands.close();

        let mut rejected = 0usize;
        while let Ok(command) = self.commands.try_recv() {
            command.reject(BillingError::bill_closed(bill_id));
            rejected += 1;
        }
        if rejected > 0 {
            debug!(bill_id = %bill_id, rejected, "Rejected commands queued behind close");
        }
    }
}
