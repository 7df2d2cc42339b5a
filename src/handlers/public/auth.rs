use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::AuthUser;
use crate::models::User;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
    pub user: User,
}

/// The user behind the bearer token.
pub async fn get_session(AuthUser(user): AuthUser) -> Result<Json<SessionResponse>> {
    Ok(Json(SessionResponse { user }))
}

/// Exchange a refresh token for a new token pair. Refresh tokens are single use.
pub async fn refresh_session(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>> {
    let token = request.refresh_token.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest(msg::INVALID_REFRESH_TOKEN.into()));
    }

    let mut conn = state.db.get()?;
    let (user, issued) = queries::rotate_refresh_token(&mut conn, token)?.ok_or_else(|| {
        tracing::debug!("Refresh token rejected");
        AppError::Unauthorized
    })?;

    Ok(Json(RefreshResponse {
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        access_expires_at: issued.access_expires_at,
        refresh_expires_at: issued.refresh_expires_at,
        user,
    }))
}
