use axum::{Extension, extract::State};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::middleware::AdminContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionsRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelSubscriptionsResponse {
    pub success: bool,
    pub cancelled: usize,
}

/// Cancel every active subscription of a user.
pub async fn cancel_subscriptions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Json(request): Json<CancelSubscriptionsRequest>,
) -> Result<Json<CancelSubscriptionsResponse>> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::BadRequest(msg::MISSING_USER_ID.into()));
    }

    let conn = state.db.get()?;
    queries::get_user_by_id(&conn, user_id)?.or_not_found(msg::USER_NOT_FOUND)?;
    let cancelled = queries::cancel_active_subscriptions(&conn, user_id)?;

    tracing::info!(user_id, admin_id = %ctx.user.id, cancelled, "Subscriptions cancelled by admin");

    Ok(Json(CancelSubscriptionsResponse {
        success: true,
        cancelled,
    }))
}
