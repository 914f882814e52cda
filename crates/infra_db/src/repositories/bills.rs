//! Bill repository implementation
//!
//! SQL access for the `bills` and `bill_line_items` tables. Inserting a line
//! item and bumping the bill total happen in one transaction that holds a
//! row lock on the bill, so a concurrent close cannot interleave.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

const BILL_COLUMNS: &str = "id, status, currency, total_minor, created_at, closed_at";
const LINE_ITEM_COLUMNS: &str = "id, bill_id, description, amount_minor, created_at";

/// A row of the `bills` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BillRow {
    pub id: Uuid,
    pub status: String,
    pub currency: String,
    pub total_minor: i64,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// A row of the `bill_line_items` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LineItemRow {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub description: String,
    pub amount_minor: i64,
    pub created_at: DateTime<Utc>,
}

/// Data for a line item insert
#[derive(Debug, Clone)]
pub struct NewLineItemRow {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub description: String,
    pub amount_minor: i64,
    /// Checked against the bill's currency, not stored
    pub currency: String,
}

/// How a line item insert resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItemWrite {
    Inserted(LineItemRow),
    Existing(LineItemRow),
    /// The id is already used by a line item of another bill
    ForeignBill { owner: Uuid },
    BillMissing,
    BillClosed,
    CurrencyMismatch { bill_currency: String },
}

/// Repository for bills and their line items
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: PgPool,
}

impl BillRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts an open bill unless the id exists; returns true if inserted
    pub async fn insert_bill(&self, id: Uuid, currency: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO bills (id, status, currency, total_minor, created_at)
            VALUES ($1, 'OPEN', $2, 0, now())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(currency)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn find_bill(&self, id: Uuid) -> Result<Option<BillRow>, DatabaseError> {
        let row = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {} FROM bills WHERE id = $1",
            BILL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Lists bills newest first; `status` of `None` lists all
    pub async fn list_bills(&self, status: Option<&str>) -> Result<Vec<BillRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {} FROM bills WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC",
            BILL_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Inserts a line item and bumps the bill total in one transaction
    ///
    /// The bill row is locked `FOR UPDATE` so the open-status and currency
    /// checks hold until commit.
    pub async fn insert_line_item(
        &self,
        item: &NewLineItemRow,
    ) -> Result<LineItemWrite, DatabaseError> {
        if let Some(existing) = self.find_line_item(item.id).await? {
            return Ok(Self::resolve_existing(existing, item.bill_id));
        }

        let mut tx = self.pool.begin().await?;

        let bill = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {} FROM bills WHERE id = $1 FOR UPDATE",
            BILL_COLUMNS
        ))
        .bind(item.bill_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(bill) = bill else {
            return Ok(LineItemWrite::BillMissing);
        };
        if bill.status != "OPEN" {
            return Ok(LineItemWrite::BillClosed);
        }
        if bill.currency != item.currency {
            return Ok(LineItemWrite::CurrencyMismatch {
                bill_currency: bill.currency,
            });
        }

        let inserted = sqlx::query_as::<_, LineItemRow>(&format!(
            "INSERT INTO bill_line_items (id, bill_id, description, amount_minor, created_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {}",
            LINE_ITEM_COLUMNS
        ))
        .bind(item.id)
        .bind(item.bill_id)
        .bind(&item.description)
        .bind(item.amount_minor)
        .fetch_optional(&mut *tx)
        .await?;

        match inserted {
            Some(row) => {
                Self::bump_total(&mut tx, item.bill_id, item.amount_minor).await?;
                tx.commit().await?;
                debug!(line_item_id = %row.id, bill_id = %row.bill_id, "Line item inserted");
                Ok(LineItemWrite::Inserted(row))
            }
            None => {
                // Lost a race with a concurrent insert of the same id.
                tx.rollback().await?;
                let existing = self
                    .find_line_item(item.id)
                    .await?
                    .ok_or_else(|| DatabaseError::not_found("LineItem", item.id))?;
                Ok(Self::resolve_existing(existing, item.bill_id))
            }
        }
    }

    pub async fn find_line_item(&self, id: Uuid) -> Result<Option<LineItemRow>, DatabaseError> {
        let row = sqlx::query_as::<_, LineItemRow>(&format!(
            "SELECT {} FROM bill_line_items WHERE id = $1",
            LINE_ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Lists a bill's items by created_at, then id
    pub async fn list_line_items(&self, bill_id: Uuid) -> Result<Vec<LineItemRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, LineItemRow>(&format!(
            "SELECT {} FROM bill_line_items WHERE bill_id = $1 ORDER BY created_at, id",
            LINE_ITEM_COLUMNS
        ))
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Closes an open bill whose stored total is `total_minor`
    ///
    /// `None` if the bill is missing, not open, or holds another total.
    pub async fn close_bill(
        &self,
        id: Uuid,
        total_minor: i64,
    ) -> Result<Option<BillRow>, DatabaseError> {
        let row = sqlx::query_as::<_, BillRow>(&format!(
            "UPDATE bills SET status = 'CLOSED', closed_at = now() \
             WHERE id = $1 AND status = 'OPEN' AND total_minor = $2 \
             RETURNING {}",
            BILL_COLUMNS
        ))
        .bind(id)
        .bind(total_minor)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn bump_total(
        tx: &mut Transaction<'_, Postgres>,
        bill_id: Uuid,
        amount_minor: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE bills SET total_minor = total_minor + $2 WHERE id = $1")
            .bind(bill_id)
            .bind(amount_minor)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    fn resolve_existing(existing: LineItemRow, bill_id: Uuid) -> LineItemWrite {
        if existing.bill_id == bill_id {
            LineItemWrite::Existing(existing)
        } else {
            LineItemWrite::ForeignBill {
                owner: existing.bill_id,
            }
        }
    }
}
