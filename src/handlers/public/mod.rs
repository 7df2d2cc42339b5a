mod auth;
mod orders;
mod tap;
mod transactions;

pub use auth::*;
pub use orders::*;
pub use tap::*;
pub use transactions::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::rate_limit::{self, RateLimitConfig};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Endpoints that call a payment provider, plus the unscoped transaction lookup.
pub fn strict_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/capture", post(capture_order))
        .route("/tap/verify", post(verify_tap_charge))
        .route("/transactions/by-order/{order_id}", get(get_transaction_by_order))
}

pub fn standard_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/session", get(get_session))
        .route("/auth/session/refresh", post(refresh_session))
}

pub fn relaxed_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    Router::new()
        .merge(strict_routes().layer(rate_limit::strict_layer(rate_limit.strict_rpm)))
        .merge(standard_routes().layer(rate_limit::standard_layer(rate_limit.standard_rpm)))
        .merge(relaxed_routes().layer(rate_limit::relaxed_layer(rate_limit.relaxed_rpm)))
}
