//! Billing domain errors

use core_kernel::{BillId, Currency, MoneyError, PortError};
use thiserror::Error;

/// Errors surfaced by the bill orchestration core
///
/// The variants follow the status-code taxonomy callers program against:
/// only `Internal` (and `Timeout`, whose outcome is unknown) may succeed if
/// the same request is retried with the same idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Malformed input: unsupported currency, non-positive amount
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown bill or line item
    #[error("Not found: {0}")]
    NotFound(String),

    /// Business rejection: bill closed, currency mismatch, double close
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// No acknowledgment within the deadline; the command may still be applied
    #[error("Timed out after {duration_ms}ms waiting for {operation}; outcome unknown")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// Infrastructure failure after retries were exhausted
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    pub fn bill_not_found(bill_id: BillId) -> Self {
        BillingError::NotFound(format!("bill {} not found", bill_id))
    }

    pub fn bill_closed(bill_id: BillId) -> Self {
        BillingError::FailedPrecondition(format!("bill {} is closed", bill_id))
    }

    pub fn currency_mismatch(expected: Currency, actual: Currency) -> Self {
        BillingError::FailedPrecondition(format!(
            "currency mismatch: bill is {}, line item is {}",
            expected, actual
        ))
    }

    pub fn non_positive_amount(amount_minor: i64) -> Self {
        BillingError::InvalidArgument(format!(
            "amount must be positive, got {} minor units",
            amount_minor
        ))
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::InvalidArgument(_) => "invalid_argument",
            BillingError::NotFound(_) => "not_found",
            BillingError::FailedPrecondition(_) => "failed_precondition",
            BillingError::Timeout { .. } => "deadline_exceeded",
            BillingError::Internal(_) => "internal",
        }
    }

    /// Returns true for business rejections that no retry will change
    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            BillingError::InvalidArgument(_)
                | BillingError::NotFound(_)
                | BillingError::FailedPrecondition(_)
        )
    }
}

impl From<PortError> for BillingError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => {
                BillingError::NotFound(format!("{} {} not found", entity_type, id))
            }
            PortError::Validation { message, .. } => BillingError::InvalidArgument(message),
            PortError::Conflict { message } => BillingError::FailedPrecondition(message),
            other => BillingError::Internal(other.to_string()),
        }
    }
}

impl From<MoneyError> for BillingError {
    fn from(error: MoneyError) -> Self {
        match error {
            MoneyError::CurrencyMismatch(..) => BillingError::FailedPrecondition(error.to_string()),
            _ => BillingError::InvalidArgument(error.to_string()),
        }
    }
}
