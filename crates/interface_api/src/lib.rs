//! HTTP API Layer
//!
//! This crate exposes the bill ledger over REST using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for bills and health checks
//! - **Middleware**: Tracing and request logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Billing errors mapped onto HTTP status codes
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let service = Arc::new(BillingService::new(store, config.billing()));
//! let app = create_router(service);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_billing::BillingService;

use crate::handlers::{bills, health};
use crate::middleware::request_log_middleware;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BillingService>,
}

/// Creates the main API router
///
/// # Arguments
///
/// * `service` - Billing service backed by a ledger store
pub fn create_router(service: Arc<BillingService>) -> Router {
    let state = AppState { service };

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let bill_routes = Router::new()
        .route("/", post(bills::create_bill).get(bills::list_bills))
        .route("/:id", get(bills::get_bill))
        .route("/:id/line-items", post(bills::add_line_item))
        .route("/:id/close", post(bills::close_bill));

    let api_routes = Router::new()
        .nest("/bills", bill_routes)
        .layer(axum_middleware::from_fn(request_log_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
