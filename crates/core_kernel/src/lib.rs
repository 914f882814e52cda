//! Core Kernel - Foundational types shared by the billing workspace
//!
//! This crate provides the building blocks used by every other crate:
//! - Money held in integer minor units, and the supported currencies
//! - Strongly-typed identifiers that double as idempotency keys
//! - Port error and health-check types for the ports-and-adapters layering

pub mod money;
pub mod identifiers;
pub mod ports;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{BillId, LineItemId, IdParseError};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
