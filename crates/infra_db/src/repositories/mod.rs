//! Repository implementations for domain entities
//!
//! Repositories encapsulate SQL queries and map between database rows and
//! plain row types. Queries are built at runtime with `sqlx::query_as`, so
//! the crate compiles without a live database.
//!
//! Each repository follows these principles:
//! - Multi-statement writes run in one transaction
//! - Row locks guard check-then-write sequences
//! - Inserts keyed by caller-supplied ids are idempotent

pub mod bills;

pub use bills::{BillRepository, BillRow, LineItemRow, LineItemWrite, NewLineItemRow};
