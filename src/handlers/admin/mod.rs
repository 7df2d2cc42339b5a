mod subscriptions;
mod transactions;
mod users;

pub use subscriptions::*;
pub use transactions::*;
pub use users::*;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::admin_auth;

/// Admin API. Every route requires the bearer token of an admin user.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/transactions", get(list_transactions))
        .route("/admin/subscriptions/cancel", post(cancel_subscriptions))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}
