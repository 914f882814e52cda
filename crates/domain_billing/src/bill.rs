//! Bill and line item model
//!
//! A bill accrues immutable line items while `Open` and is frozen with a
//! final total when `Closed`. The stored `total_minor` always equals the sum
//! of the bill's line item amounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{BillId, Currency, LineItemId, Money};

use crate::error::BillingError;

/// Longest description accepted on a line item
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Bill lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BillStatus {
    /// Accepting line items
    Open,
    /// Frozen with a final total
    Closed,
}

impl BillStatus {
    /// Persisted representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Open => "OPEN",
            BillStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(BillStatus::Open),
            "CLOSED" => Ok(BillStatus::Closed),
            _ => Err(BillingError::InvalidArgument(format!("invalid bill status '{}'", s))),
        }
    }
}

/// The bill aggregate row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    /// Unique identifier, immutable once created
    pub id: BillId,
    /// Lifecycle status
    pub status: BillStatus,
    /// Currency fixed at creation
    pub currency: Currency,
    /// Sum of all line item amounts, in minor units
    pub total_minor: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on transition to `Closed`
    pub closed_at: Option<DateTime<Utc>>,
}

impl Bill {
    pub fn is_open(&self) -> bool {
        self.status == BillStatus::Open
    }

    /// Returns the total as Money
    pub fn total(&self) -> Money {
        Money::from_minor(self.total_minor, self.currency)
    }

    /// Fails with `FailedPrecondition` unless the bill is open
    pub fn ensure_open(&self) -> Result<(), BillingError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BillingError::bill_closed(self.id))
        }
    }

    /// Fails with `FailedPrecondition` if `currency` differs from the bill's
    pub fn ensure_currency(&self, currency: Currency) -> Result<(), BillingError> {
        if self.currency == currency {
            Ok(())
        } else {
            Err(BillingError::currency_mismatch(self.currency, currency))
        }
    }
}

/// An immutable monetary entry attributed to one bill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub bill_id: BillId,
    pub description: String,
    /// Strictly positive amount in minor units of the bill currency
    pub amount_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    pub fn amount(&self, currency: Currency) -> Money {
        Money::from_minor(self.amount_minor, currency)
    }
}

/// A bill together with its line items in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSnapshot {
    pub bill: Bill,
    pub items: Vec<LineItem>,
}

impl BillSnapshot {
    /// Sum of the item amounts, independent of the stored total
    pub fn items_total_minor(&self) -> i64 {
        self.items.iter().map(|item| item.amount_minor).sum()
    }

    /// True when the stored total matches the items
    pub fn is_consistent(&self) -> bool {
        self.bill.total_minor == self.items_total_minor()
    }
}

/// Data for creating a bill row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBill {
    pub id: BillId,
    pub currency: Currency,
}

/// Data for inserting a line item
///
/// `currency` is not persisted; the store checks it against the bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub id: LineItemId,
    pub bill_id: BillId,
    pub description: String,
    pub amount_minor: i64,
    pub currency: Currency,
}

impl NewLineItem {
    /// Checks the input-only rules (amount and description)
    pub fn validate(&self) -> Result<(), BillingError> {
        validate_line_item_input(&self.description, self.amount_minor)
    }
}

/// Shared input checks for line items, applied at the boundary and again
/// inside the insert step
pub fn validate_line_item_input(description: &str, amount_minor: i64) -> Result<(), BillingError> {
    if amount_minor <= 0 {
        return Err(BillingError::non_positive_amount(amount_minor));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(BillingError::InvalidArgument(format!(
            "description exceeds {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_bill() -> Bill {
        Bill {
            id: BillId::new_v7(),
            status: BillStatus::Open,
            currency: Currency::USD,
            total_minor: 0,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("open".parse::<BillStatus>().unwrap(), BillStatus::Open);
        assert_eq!("CLOSED".parse::<BillStatus>().unwrap(), BillStatus::Closed);
        assert!("pending".parse::<BillStatus>().is_err());
    }

    #[test]
    fn test_guards() {
        let mut bill = open_bill();
        assert!(bill.ensure_open().is_ok());
        assert!(bill.ensure_currency(Currency::GEL).is_err());

        bill.status = BillStatus::Closed;
        assert!(matches!(bill.ensure_open(), Err(BillingError::FailedPrecondition(_))));
    }

    #[test]
    fn test_line_item_validation() {
        assert!(validate_line_item_input("coffee", 450).is_ok());
        assert!(matches!(
            validate_line_item_input("refund", 0),
            Err(BillingError::InvalidArgument(_))
        ));
        assert!(validate_line_item_input(&"x".repeat(MAX_DESCRIPTION_LEN + 1), 1).is_err());
    }
}
