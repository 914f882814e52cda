//! Bill handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum::extract::rejection::JsonRejection;

use core_kernel::BillId;
use domain_billing::{BillStatus, SubmitLineItem};

use crate::dto::bills::*;
use crate::{error::ApiError, AppState};

/// Creates a bill, or returns the existing one for a repeated id
pub async fn create_bill(
    State(state): State<AppState>,
    body: Result<Json<CreateBillRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BillResponse>), ApiError> {
    let Json(request) = body?;
    let bill = state
        .service
        .create_bill(&request.currency, request.bill_id()?)
        .await?;

    Ok((StatusCode::CREATED, Json(BillResponse::from(&bill))))
}

/// Lists bills, newest first, optionally filtered by status
pub async fn list_bills(
    State(state): State<AppState>,
    Query(query): Query<ListBillsQuery>,
) -> Result<Json<Vec<BillResponse>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<BillStatus>)
        .transpose()?;

    let bills = state.service.list_bills(status).await?;
    Ok(Json(bills.iter().map(BillResponse::from).collect()))
}

/// Gets a bill with its line items
pub async fn get_bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BillResponse>, ApiError> {
    let bill_id: BillId = parse_id(&id)?;
    let snapshot = state.service.get_bill(bill_id).await?;
    Ok(Json(BillResponse::from(&snapshot)))
}

/// Appends a line item to an open bill
///
/// Responds with the stored item and the bill as read after the append.
pub async fn add_line_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AddLineItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddLineItemResponse>), ApiError> {
    let bill_id: BillId = parse_id(&id)?;
    let Json(request) = body?;
    let submit = SubmitLineItem::try_from(request)?;

    let item = state.service.submit_add_line_item(bill_id, submit).await?;
    let snapshot = state.service.get_bill(bill_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(AddLineItemResponse::new(&snapshot.bill, &item)),
    ))
}

/// Closes a bill and returns its final state
pub async fn close_bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BillResponse>, ApiError> {
    let bill_id: BillId = parse_id(&id)?;
    let snapshot = state.service.submit_close(bill_id).await?;
    Ok(Json(BillResponse::from(&snapshot)))
}
