use std::sync::Arc;

use axum::{Extension, extract::State};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Query};
use crate::middleware::AdminContext;
use crate::models::{CreateUser, IssuedTokens, User};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user: User,
    /// Initial credentials. Only returned once.
    pub tokens: IssuedTokens,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Paginated<User>>> {
    let limit = query.limit();
    let offset = query.offset();

    if let Some(page) = state.user_cache.get(limit, offset).await {
        tracing::debug!(limit, offset, "User list served from cache");
        return Ok(Json(Paginated::clone(&page)));
    }

    let page = {
        let conn = state.db.get()?;
        let (items, total) = queries::list_users_paginated(&conn, limit, offset)?;
        Arc::new(Paginated::new(items, total, limit, offset))
    };
    state.user_cache.insert(limit, offset, page.clone()).await;
    Ok(Json(Paginated::clone(&page)))
}

/// Create a user and issue its first token pair.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Json(input): Json<CreateUser>,
) -> Result<Json<CreateUserResponse>> {
    input.validate()?;

    let mut conn = state.db.get()?;
    if queries::get_user_by_email(&conn, &input.email)?.is_some() {
        return Err(AppError::Conflict(msg::EMAIL_TAKEN.into()));
    }

    let tx = conn.transaction()?;
    let user = queries::create_user(&tx, &input)?;
    let tokens = queries::issue_tokens(&tx, &user.id)?;
    tx.commit()?;

    state.user_cache.invalidate_all();
    tracing::info!(
        user_id = %user.id,
        admin_id = %ctx.user.id,
        is_admin = user.is_admin,
        "User created"
    );

    Ok(Json(CreateUserResponse { user, tokens }))
}
