//! Mailbox: routes commands to per-bill orchestrators
//!
//! The mailbox maps a bill id to the sending half of that bill's command
//! channel. When a command arrives for a bill whose orchestrator is not
//! running (first touch after a restart, or after the task died), the
//! mailbox consults the store and recovers the orchestrator from durable
//! state. Recovery for one bill is serialized by a per-bill slot lock, so at
//! most one orchestrator ever runs per bill. A bill's slot is dropped from
//! the registry once its orchestrator terminates or the bill is found closed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};

use core_kernel::{BillId, Currency};

use crate::activities::ActivityExecutor;
use crate::bill::{Bill, BillSnapshot, BillStatus, LineItem};
use crate::command::{AddLineItem, BillCommand, CommandReply};
use crate::error::BillingError;
use crate::orchestrator::{BillOrchestrator, Startup};

/// Attempts to deliver one command when its orchestrator keeps stopping
const MAX_DELIVERY_ATTEMPTS: usize = 3;

/// Mailbox sizing and acknowledgment deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxConfig {
    /// Buffered commands per bill before senders wait
    pub capacity: usize,
    /// How long a caller waits for a command to be acknowledged
    pub ack_timeout: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            ack_timeout: Duration::from_secs(10),
        }
    }
}

type Slot = Arc<Mutex<Option<mpsc::Sender<BillCommand>>>>;
type Slots = Arc<RwLock<HashMap<BillId, Slot>>>;

/// Registry of running bill orchestrators
#[derive(Debug)]
pub struct BillMailbox {
    activities: ActivityExecutor,
    config: MailboxConfig,
    slots: Slots,
}

impl BillMailbox {
    /// A zero capacity is raised to one; command channels need a buffer.
    pub fn new(activities: ActivityExecutor, mut config: MailboxConfig) -> Self {
        config.capacity = config.capacity.max(1);
        Self {
            activities,
            config,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    /// Starts (or re-attaches to) the orchestrator for a bill
    ///
    /// Idempotent per bill id: a second open returns the existing row.
    /// Opening an existing bill with another currency is `FailedPrecondition`.
    pub async fn open(&self, bill_id: BillId, currency: Currency) -> Result<Bill, BillingError> {
        let slot = self.slot(bill_id).await;
        let mut guard = slot.lock().await;

        if guard.as_ref().is_some_and(|sender| !sender.is_closed()) {
            let bill = self.activities.load_bill(bill_id).await?;
            if bill.currency != currency {
                return Err(BillingError::FailedPrecondition(format!(
                    "bill {} already exists with currency {}",
                    bill_id, bill.currency
                )));
            }
            return Ok(bill);
        }

        let (tx, rx) = mpsc::channel(self.config.capacity);
        match BillOrchestrator::start(bill_id, currency, self.activities.clone(), rx).await? {
            Startup::Ready { orchestrator, bill } => {
                self.spawn(bill_id, &slot, orchestrator);
                *guard = Some(tx);
                Ok(bill)
            }
            Startup::Closed(bill) => {
                *guard = None;
                drop(guard);
                Self::release(&self.slots, bill_id, &slot).await;
                Ok(bill)
            }
        }
    }

    /// Enqueues a command for the bill, recovering its orchestrator if needed
    ///
    /// # Errors
    ///
    /// - `NotFound` if the bill does not exist
    /// - `FailedPrecondition` if the bill is closed
    pub async fn send(&self, bill_id: BillId, command: BillCommand) -> Result<(), BillingError> {
        let mut command = command;
        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            let sender = self.sender_for(bill_id).await?;
            match sender.send(command).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    debug!(bill_id = %bill_id, attempt, "Orchestrator stopped before delivery, re-resolving");
                    command = returned;
                }
            }
        }

        let err = BillingError::Internal(format!(
            "orchestrator for bill {} kept stopping during delivery",
            bill_id
        ));
        command.reject(err.clone());
        Err(err)
    }

    /// Sends an add-line-item command and waits for its acknowledgment
    pub async fn add_line_item(
        &self,
        bill_id: BillId,
        item: AddLineItem,
    ) -> Result<LineItem, BillingError> {
        let (command, reply) = BillCommand::add_line_item(item);
        self.deliver("add_line_item", bill_id, command, reply).await
    }

    /// Sends a close command and waits for the final snapshot
    pub async fn close(&self, bill_id: BillId) -> Result<BillSnapshot, BillingError> {
        let (command, reply) = BillCommand::close();
        self.deliver("close", bill_id, command, reply).await
    }

    /// Restarts orchestrators for every open bill in the store
    ///
    /// Returns how many bills are now served by a running orchestrator.
    pub async fn recover_open_bills(&self) -> Result<usize, BillingError> {
        let open = self
            .activities
            .list_bills(Some(BillStatus::Open))
            .await?;

        let mut recovered = 0usize;
        for bill in open {
            match self.sender_for(bill.id).await {
                Ok(_) => recovered += 1,
                // Closed between the listing and the recovery attempt.
                Err(BillingError::FailedPrecondition(_)) => {}
                Err(err) => {
                    warn!(bill_id = %bill.id, error = %err, "Failed to recover bill orchestrator");
                    return Err(err);
                }
            }
        }

        info!(recovered, "Recovered open bill orchestrators");
        Ok(recovered)
    }

    /// True if an orchestrator is currently running for the bill
    pub async fn is_running(&self, bill_id: BillId) -> bool {
        let Some(slot) = self.existing_slot(bill_id).await else {
            return false;
        };
        let guard = slot.lock().await;
        guard.as_ref().is_some_and(|sender| !sender.is_closed())
    }

    /// Number of bills with a registry entry, running or not
    pub async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Number of running orchestrators
    pub async fn running(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        let mut running = 0;
        for slot in slots {
            if slot.lock().await.as_ref().is_some_and(|s| !s.is_closed()) {
                running += 1;
            }
        }
        running
    }

    async fn deliver<T>(
        &self,
        operation: &str,
        bill_id: BillId,
        command: BillCommand,
        reply: CommandReply<T>,
    ) -> Result<T, BillingError> {
        let deadline = self.config.ack_timeout;
        let exchange = async {
            self.send(bill_id, command).await?;
            reply.await.map_err(|_| {
                BillingError::Internal(format!(
                    "orchestrator for bill {} stopped before replying",
                    bill_id
                ))
            })?
        };

        match timeout(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(bill_id = %bill_id, operation, timeout_ms = deadline.as_millis() as u64, "Command acknowledgment timed out");
                Err(BillingError::Timeout {
                    operation: operation.to_string(),
                    duration_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    async fn existing_slot(&self, bill_id: BillId) -> Option<Slot> {
        self.slots.read().await.get(&bill_id).cloned()
    }

    async fn slot(&self, bill_id: BillId) -> Slot {
        if let Some(slot) = self.existing_slot(bill_id).await {
            return slot;
        }
        self.slots.write().await.entry(bill_id).or_default().clone()
    }

    /// Returns a live sender for the bill, recovering its orchestrator if
    /// none is running
    async fn sender_for(&self, bill_id: BillId) -> Result<mpsc::Sender<BillCommand>, BillingError> {
        let slot = match self.existing_slot(bill_id).await {
            Some(slot) => slot,
            None => {
                // Unknown ids never get a slot.
                self.activities.load_bill(bill_id).await?;
                self.slot(bill_id).await
            }
        };

        let mut guard = slot.lock().await;
        if let Some(sender) = guard.as_ref().filter(|s| !s.is_closed()) {
            return Ok(sender.clone());
        }

        let bill = self.activities.load_bill(bill_id).await?;
        if !bill.is_open() {
            *guard = None;
            drop(guard);
            Self::release(&self.slots, bill_id, &slot).await;
            return Err(BillingError::bill_closed(bill_id));
        }

        let (tx, rx) = mpsc::channel(self.config.capacity);
        let orchestrator = BillOrchestrator::recover(bill, self.activities.clone(), rx).await?;
        self.spawn(bill_id, &slot, orchestrator);
        *guard = Some(tx.clone());

        info!(bill_id = %bill_id, "Recovered bill orchestrator");
        Ok(tx)
    }

    /// Runs the orchestrator on its own task and drops its slot when it ends
    fn spawn(&self, bill_id: BillId, slot: &Slot, orchestrator: BillOrchestrator) {
        let span = info_span!("bill_orchestrator", bill_id = %bill_id);
        let slots = Arc::clone(&self.slots);
        let slot = Arc::clone(slot);
        tokio::spawn(
            async move {
                orchestrator.run().await;
                Self::release(&slots, bill_id, &slot).await;
            }
            .instrument(span),
        );
    }

    /// Removes the bill's entry if it is still `slot` and holds no live sender
    ///
    /// Callers must not hold the slot lock. A slot locked by someone else is
    /// left alone; that holder finds the sender closed and releases it.
    async fn release(slots: &Slots, bill_id: BillId, slot: &Slot) {
        let mut slots = slots.write().await;
        let Some(current) = slots.get(&bill_id) else {
            return;
        };
        if !Arc::ptr_eq(current, slot) {
            return;
        }
        let idle = match slot.try_lock() {
            Ok(guard) => guard.as_ref().map_or(true, |sender| sender.is_closed()),
            Err(_) => false,
        };
        if idle {
            slots.remove(&bill_id);
            debug!(bill_id = %bill_id, "Released bill slot");
        }
    }
}
