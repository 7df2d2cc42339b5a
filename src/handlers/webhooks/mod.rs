mod tap;

pub use tap::handle_tap_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/tap", post(handle_tap_webhook))
}
