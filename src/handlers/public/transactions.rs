use axum::extract::State;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::middleware::MaybeUser;
use crate::models::{Subscription, SubscriptionStatus, Transaction, TransactionStatus};
use crate::payments::PaymentProvider;

/// Transaction fields exposed by the recovery lookup. Amounts and capture ids are
/// only included for the owner.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub provider: PaymentProvider,
    pub order_id: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub start_date: i64,
    pub end_date: Option<i64>,
    pub is_lifetime: bool,
}

#[derive(Debug, Serialize)]
pub struct TransactionLookupResponse {
    pub transaction: Option<TransactionSummary>,
    pub subscription: Option<SubscriptionSummary>,
}

impl TransactionSummary {
    fn new(t: Transaction, owner_view: bool) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            plan_id: t.plan_id,
            provider: t.provider,
            order_id: t.provider_order_id,
            status: t.status,
            provider_status: owner_view.then_some(t.provider_status).flatten(),
            capture_id: owner_view.then_some(t.capture_id).flatten(),
            amount_cents: owner_view.then_some(t.amount_cents),
            currency: owner_view.then_some(t.currency),
            created_at: t.created_at,
        }
    }
}

impl From<Subscription> for SubscriptionSummary {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id,
            plan_id: s.plan_id,
            status: s.status,
            start_date: s.start_date,
            end_date: s.end_date,
            is_lifetime: s.is_lifetime,
        }
    }
}

/// Recover the transaction for a provider order id after a redirect lost the session.
///
/// With a bearer token the lookup is scoped to the caller. Without one it is an
/// unscoped lookup by order id (strict rate limit tier) used for attribution only.
/// No match is not an error: both fields come back null.
pub async fn get_transaction_by_order(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    Path(order_id): Path<String>,
) -> Result<Json<TransactionLookupResponse>> {
    let conn = state.db.get()?;

    let transaction = match caller {
        Some(ref user) => queries::get_user_transaction_by_order(&conn, &user.id, &order_id)?,
        None => queries::get_transaction_by_order(&conn, &order_id)?,
    };

    let subscription = match transaction {
        Some(ref t) => {
            let charge_id = t.capture_id.as_deref().unwrap_or(&t.provider_order_id);
            queries::get_subscription_by_charge_id(&conn, charge_id)?
        }
        None => None,
    };

    tracing::debug!(
        order_id = %order_id,
        scoped = caller.is_some(),
        found = transaction.is_some(),
        "Transaction lookup"
    );

    let owner_view = caller.is_some();
    Ok(Json(TransactionLookupResponse {
        transaction: transaction.map(|t| TransactionSummary::new(t, owner_view)),
        subscription: subscription.map(Into::into),
    }))
}
