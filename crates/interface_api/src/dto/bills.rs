//! Bill DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use core_kernel::{BillId, Currency, IdParseError, Money};
use domain_billing::{Bill, BillSnapshot, LineItem, SubmitLineItem};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateBillRequest {
    pub currency: String,
    /// Makes the request idempotent when supplied
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddLineItemRequest {
    pub description: String,
    pub amount_minor: i64,
    pub currency: String,
    pub id: Option<String>,
}

impl CreateBillRequest {
    pub fn bill_id(&self) -> Result<Option<BillId>, ApiError> {
        self.id.as_deref().map(parse_id).transpose()
    }
}

impl TryFrom<AddLineItemRequest> for SubmitLineItem {
    type Error = ApiError;

    fn try_from(request: AddLineItemRequest) -> Result<Self, Self::Error> {
        Ok(SubmitLineItem {
            line_item_id: request.id.as_deref().map(parse_id).transpose()?,
            description: request.description,
            amount_minor: request.amount_minor,
            currency: request.currency,
        })
    }
}

/// Parses a prefixed (`BILL-...`) or bare UUID identifier
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = IdParseError>,
{
    raw.parse()
        .map_err(|e: IdParseError| ApiError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ListBillsQuery {
    pub status: Option<String>,
}

/// An amount in minor units with its major-unit rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyDto {
    pub amount_minor: i64,
    pub currency: String,
    pub amount: Decimal,
}

impl From<Money> for MoneyDto {
    fn from(money: Money) -> Self {
        Self {
            amount_minor: money.amount_minor(),
            currency: money.currency().code().to_string(),
            amount: money.to_decimal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemResponse {
    pub id: String,
    pub bill_id: String,
    pub description: String,
    pub amount: MoneyDto,
    pub created_at: DateTime<Utc>,
}

impl LineItemResponse {
    pub fn new(item: &LineItem, currency: Currency) -> Self {
        Self {
            id: item.id.to_string(),
            bill_id: item.bill_id.to_string(),
            description: item.description.clone(),
            amount: item.amount(currency).into(),
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillResponse {
    pub id: String,
    pub status: String,
    pub currency: String,
    pub total: MoneyDto,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LineItemResponse>>,
}

impl From<&Bill> for BillResponse {
    fn from(bill: &Bill) -> Self {
        Self {
            id: bill.id.to_string(),
            status: bill.status.to_string(),
            currency: bill.currency.code().to_string(),
            total: bill.total().into(),
            created_at: bill.created_at,
            closed_at: bill.closed_at,
            items: None,
        }
    }
}

impl From<&BillSnapshot> for BillResponse {
    fn from(snapshot: &BillSnapshot) -> Self {
        let items = snapshot
            .items
            .iter()
            .map(|item| LineItemResponse::new(item, snapshot.bill.currency))
            .collect();

        Self {
            items: Some(items),
            ..BillResponse::from(&snapshot.bill)
        }
    }
}

/// Result of appending a line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddLineItemResponse {
    pub bill: BillResponse,
    pub line_item: LineItemResponse,
}

impl AddLineItemResponse {
    pub fn new(bill: &Bill, item: &LineItem) -> Self {
        Self {
            bill: BillResponse::from(bill),
            line_item: LineItemResponse::new(item, bill.currency),
        }
    }
}
