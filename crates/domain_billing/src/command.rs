//! Commands delivered to a bill orchestrator
//!
//! Both command kinds travel through a single FIFO channel per bill, so the
//! orchestrator sees them in the order callers enqueued them. Each command
//! carries a oneshot responder for its acknowledgment.

use tokio::sync::oneshot;

use core_kernel::{Currency, LineItemId};

use crate::bill::{BillSnapshot, LineItem};
use crate::error::BillingError;

/// Reply channel for a command's outcome
pub type CommandResponder<T> = oneshot::Sender<Result<T, BillingError>>;

/// Receiving half of a [`CommandResponder`]
pub type CommandReply<T> = oneshot::Receiver<Result<T, BillingError>>;

/// Payload of an add-line-item command
///
/// `line_item_id` is the idempotency key: redelivering the same id never
/// creates a second item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLineItem {
    pub line_item_id: LineItemId,
    pub description: String,
    pub amount_minor: i64,
    pub currency: Currency,
}

#[derive(Debug)]
pub enum BillCommand {
    /// Append a line item to the bill
    AddLineItem {
        item: AddLineItem,
        resp: CommandResponder<LineItem>,
    },
    /// Close the bill and freeze its total
    Close { resp: CommandResponder<BillSnapshot> },
}

impl BillCommand {
    pub fn add_line_item(item: AddLineItem) -> (Self, CommandReply<LineItem>) {
        let (resp, reply) = oneshot::channel();
        (BillCommand::AddLineItem { item, resp }, reply)
    }

    pub fn close() -> (Self, CommandReply<BillSnapshot>) {
        let (resp, reply) = oneshot::channel();
        (BillCommand::Close { resp }, reply)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BillCommand::AddLineItem { .. } => "add_line_item",
            BillCommand::Close { .. } => "close",
        }
    }

    /// Answers the command with `error` without executing it
    pub fn reject(self, error: BillingError) {
        // A dropped receiver means the caller already gave up waiting.
        match self {
            BillCommand::AddLineItem { resp, .. } => {
                let _ = resp.send(Err(error));
            }
            BillCommand::Close { resp } => {
                let _ = resp.send(Err(error));
            }
        }
    }
}
