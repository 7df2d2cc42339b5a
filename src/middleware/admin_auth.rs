use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::models::User;
use crate::util::extract_bearer_token;

/// Authenticated admin, inserted into request extensions by [`admin_auth`].
#[derive(Clone)]
pub struct AdminContext {
    pub user: User,
}

fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<User, StatusCode> {
    let token = extract_bearer_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let user = queries::get_user_by_access_token(&conn, token)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !user.is_admin {
        tracing::warn!(user_id = %user.id, "Non-admin user attempted admin access");
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(user)
}

pub async fn admin_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = authenticate_admin(&state, request.headers())?;
    request.extensions_mut().insert(AdminContext { user });
    Ok(next.run(request).await)
}
