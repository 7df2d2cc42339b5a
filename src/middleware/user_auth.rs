use axum::{extract::FromRequestParts, http::request::Parts};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::User;
use crate::util::extract_bearer_token;

/// A request that must carry a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// A request that may carry an access token. A present but invalid token is
/// rejected rather than silently treated as anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

fn lookup(state: &AppState, parts: &Parts) -> Result<Option<User>, AppError> {
    let Some(token) = extract_bearer_token(&parts.headers) else {
        return Ok(None);
    };
    let conn = state.db.get()?;
    match queries::get_user_by_access_token(&conn, token)? {
        Some(user) => Ok(Some(user)),
        None => Err(AppError::Unauthorized),
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        lookup(state, parts)?.map(AuthUser).ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        lookup(state, parts).map(MaybeUser)
    }
}
