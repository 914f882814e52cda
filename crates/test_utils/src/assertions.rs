//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for domain types that give
//! more meaningful error messages than standard assertions.

use std::fmt::Debug;

use domain_billing::{BillSnapshot, BillStatus, BillingError};

/// Asserts the stored total equals the sum of the snapshot's items
pub fn assert_bill_consistent(snapshot: &BillSnapshot) {
    assert_eq!(
        snapshot.bill.total_minor,
        snapshot.items_total_minor(),
        "Bill {} total {} does not match its {} line items (sum {})",
        snapshot.bill.id,
        snapshot.bill.total_minor,
        snapshot.items.len(),
        snapshot.items_total_minor()
    );
}

/// Asserts a bill is closed with the expected total and item count
pub fn assert_bill_closed(snapshot: &BillSnapshot, total_minor: i64, item_count: usize) {
    assert_eq!(snapshot.bill.status, BillStatus::Closed, "Bill {} is not closed", snapshot.bill.id);
    assert!(snapshot.bill.closed_at.is_some(), "Closed bill {} has no closed_at", snapshot.bill.id);
    assert_eq!(snapshot.bill.total_minor, total_minor, "Unexpected total");
    assert_eq!(snapshot.items.len(), item_count, "Unexpected item count");
    assert_bill_consistent(snapshot);
}

/// Asserts the result is a `FailedPrecondition` error
pub fn assert_failed_precondition<T: Debug>(result: &Result<T, BillingError>) {
    assert!(
        matches!(result, Err(BillingError::FailedPrecondition(_))),
        "Expected FailedPrecondition, got {:?}",
        result
    );
}

/// Asserts the result is an `InvalidArgument` error
pub fn assert_invalid_argument<T: Debug>(result: &Result<T, BillingError>) {
    assert!(
        matches!(result, Err(BillingError::InvalidArgument(_))),
        "Expected InvalidArgument, got {:?}",
        result
    );
}

/// Asserts the result is a `NotFound` error
pub fn assert_not_found<T: Debug>(result: &Result<T, BillingError>) {
    assert!(
        matches!(result, Err(BillingError::NotFound(_))),
        "Expected NotFound, got {:?}",
        result
    );
}
