use axum::extract::State;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{Transaction, TransactionFilters, TransactionStatus};
use crate::pagination::Paginated;
use crate::payments::PaymentProvider;

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub user_id: Option<String>,
    pub plan_id: Option<String>,
    pub provider: Option<PaymentProvider>,
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Paginated<Transaction>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    let filters = TransactionFilters {
        user_id: query.user_id,
        plan_id: query.plan_id,
        provider: query.provider,
        status: query.status,
    };

    let conn = state.db.get()?;
    let (items, total) = queries::list_transactions_paginated(&conn, &filters, limit, offset)?;
    Ok(Json(Paginated::new(items, total, limit, offset)))
}
