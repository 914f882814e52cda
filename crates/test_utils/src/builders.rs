//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, Utc};
use core_kernel::{BillId, Currency, LineItemId};
use domain_billing::{Bill, BillStatus, LineItem, SubmitLineItem};

/// Builder for bill rows
pub struct BillBuilder {
    bill: Bill,
}

impl Default for BillBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BillBuilder {
    /// An open USD bill with a zero total
    pub fn new() -> Self {
        Self {
            bill: Bill {
                id: BillId::new_v7(),
                status: BillStatus::Open,
                currency: Currency::USD,
                total_minor: 0,
                created_at: Utc::now(),
                closed_at: None,
            },
        }
    }

    pub fn with_id(mut self, id: BillId) -> Self {
        self.bill.id = id;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.bill.currency = currency;
        self
    }

    pub fn with_total_minor(mut self, total_minor: i64) -> Self {
        self.bill.total_minor = total_minor;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.bill.created_at = created_at;
        self
    }

    /// Marks the bill closed now
    pub fn closed(mut self) -> Self {
        self.bill.status = BillStatus::Closed;
        self.bill.closed_at = Some(Utc::now());
        self
    }

    pub fn build(self) -> Bill {
        self.bill
    }
}

/// Builder for stored line items
pub struct LineItemBuilder {
    item: LineItem,
}

impl LineItemBuilder {
    pub fn new(bill_id: BillId) -> Self {
        Self {
            item: LineItem {
                id: LineItemId::new_v7(),
                bill_id,
                description: "Test item".to_string(),
                amount_minor: 100,
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, id: LineItemId) -> Self {
        self.item.id = id;
        self
    }

    pub fn with_amount_minor(mut self, amount_minor: i64) -> Self {
        self.item.amount_minor = amount_minor;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.item.description = description.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.item.created_at = created_at;
        self
    }

    pub fn build(self) -> LineItem {
        self.item
    }
}

/// Builder for line item requests
pub struct SubmitLineItemBuilder {
    request: SubmitLineItem,
}

impl Default for SubmitLineItemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmitLineItemBuilder {
    /// A $1.00 USD request with a fresh idempotency key
    pub fn new() -> Self {
        Self {
            request: SubmitLineItem {
                line_item_id: Some(LineItemId::new_v7()),
                description: "Test item".to_string(),
                amount_minor: 100,
                currency: "USD".to_string(),
            },
        }
    }

    pub fn with_id(mut self, id: LineItemId) -> Self {
        self.request.line_item_id = Some(id);
        self
    }

    /// Leaves the idempotency key for the service to generate
    pub fn without_id(mut self) -> Self {
        self.request.line_item_id = None;
        self
    }

    pub fn with_amount_minor(mut self, amount_minor: i64) -> Self {
        self.request.amount_minor = amount_minor;
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.request.currency = currency.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.request.description = description.into();
        self
    }

    pub fn build(self) -> SubmitLineItem {
        self.request
    }
}
