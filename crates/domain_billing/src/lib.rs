//! Billing Domain - Bill Ledger Orchestration
//!
//! Bills accumulate line items while open and freeze their total on close.
//! Each open bill is owned by one long-lived orchestrator task that applies
//! commands strictly in arrival order, so the running total has a single
//! writer. All durable effects go through a [`LedgerStore`] port, and an
//! orchestrator can always be rebuilt from what the store holds.
//!
//! # Components
//!
//! - **Activities**: idempotent store steps with transient-failure retry
//! - **Orchestrator**: per-bill command loop and replayable state
//! - **Mailbox**: routes commands to orchestrators, recovering them on demand
//! - **Service**: request validation and the public operations
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BillingService, BillingConfig, InMemoryLedgerStore, SubmitLineItem};
//!
//! let service = BillingService::new(Arc::new(InMemoryLedgerStore::new()), BillingConfig::default());
//!
//! let bill = service.create_bill("USD", None).await?;
//! service.submit_add_line_item(bill.id, SubmitLineItem {
//!     line_item_id: None,
//!     description: "Espresso".to_string(),
//!     amount_minor: 450,
//!     currency: "USD".to_string(),
//! }).await?;
//!
//! let closed = service.submit_close(bill.id).await?;
//! assert_eq!(closed.bill.total_minor, 450);
//! ```

pub mod activities;
pub mod bill;
pub mod command;
pub mod error;
pub mod mailbox;
pub mod memory;
pub mod orchestrator;
pub mod ports;
pub mod retry;
pub mod service;

pub use activities::ActivityExecutor;
pub use bill::{Bill, BillSnapshot, BillStatus, LineItem, NewBill, NewLineItem};
pub use command::{AddLineItem, BillCommand, CommandResponder};
pub use error::BillingError;
pub use mailbox::{BillMailbox, MailboxConfig};
pub use memory::InMemoryLedgerStore;
pub use orchestrator::{BillOrchestrator, OrchestratorState, Startup};
pub use ports::{LedgerStore, LineItemInsert};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use service::{BillingConfig, BillingService, SubmitLineItem};
