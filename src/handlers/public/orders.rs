use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::middleware::MaybeUser;
use crate::models::CreateTransaction;
use crate::payments::{
    CreatePayment, PayPalClient, PaymentError, PaymentGateway, PaymentProvider, ProviderCapture,
    ProviderOrder, TapClient, amount_to_cents,
};
use crate::settlement::settle_capture;
use crate::util::with_query;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub provider: String,
    pub amount: f64,
    pub plan_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub approve_url: Option<String>,
    pub provider: PaymentProvider,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOrderRequest {
    pub provider: String,
    pub order_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOrderResponse {
    pub success: bool,
    pub capture_id: Option<String>,
    pub status: String,
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
}

pub(crate) fn parse_provider(provider: &str) -> Result<PaymentProvider> {
    provider
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(msg::INVALID_PROVIDER.into()))
}

pub(crate) fn paypal_client(state: &AppState) -> std::result::Result<&PayPalClient, PaymentError> {
    state
        .paypal
        .as_ref()
        .ok_or(PaymentError::Configuration { provider: "paypal" })
}

pub(crate) fn tap_client(state: &AppState) -> std::result::Result<&TapClient, PaymentError> {
    state
        .tap
        .as_ref()
        .ok_or(PaymentError::Configuration { provider: "tap" })
}

async fn create_with<G: PaymentGateway>(
    gateway: &G,
    request: &CreatePayment,
) -> std::result::Result<ProviderOrder, PaymentError> {
    tracing::debug!(
        provider = %gateway.provider(),
        plan_id = %request.plan_id,
        amount_cents = request.amount_cents,
        "Creating provider order"
    );
    gateway.create_payment(request).await
}

async fn capture_with<G: PaymentGateway>(
    gateway: &G,
    order_id: &str,
) -> std::result::Result<ProviderCapture, PaymentError> {
    tracing::debug!(provider = %gateway.provider(), order_id, "Capturing provider order");
    gateway.capture_payment(order_id).await
}

/// Create a provider order/charge for a plan and record it as a pending transaction.
pub async fn create_order(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>> {
    let provider = parse_provider(&request.provider)?;
    let plan_id = request.plan_id.trim();
    let user_id = request.user_id.trim();
    if plan_id.is_empty() {
        return Err(AppError::BadRequest(msg::MISSING_PLAN_ID.into()));
    }
    if user_id.is_empty() {
        return Err(AppError::BadRequest(msg::MISSING_USER_ID.into()));
    }
    let amount_cents =
        amount_to_cents(request.amount).ok_or_else(|| AppError::BadRequest(msg::INVALID_AMOUNT.into()))?;

    if caller.as_ref().is_some_and(|c| c.id != user_id) {
        return Err(AppError::Forbidden(msg::USER_MISMATCH.into()));
    }

    let (plan, user) = {
        let conn = state.db.get()?;
        let plan = queries::get_plan_by_id(&conn, plan_id)?.or_not_found(msg::PLAN_NOT_FOUND)?;
        let user = queries::get_user_by_id(&conn, user_id)?.or_not_found(msg::USER_NOT_FOUND)?;
        (plan, user)
    };

    if !plan.is_active {
        return Err(AppError::BadRequest(msg::PLAN_INACTIVE.into()));
    }
    if plan.price_cents != amount_cents {
        tracing::warn!(
            plan_id = %plan.id,
            expected = plan.price_cents,
            received = amount_cents,
            "Order amount does not match plan price"
        );
        return Err(AppError::BadRequest(msg::AMOUNT_MISMATCH.into()));
    }

    let callback_base = format!("{}/payment/callback", state.site_url.trim_end_matches('/'));
    let payment = CreatePayment {
        amount_cents: plan.price_cents,
        currency: plan.currency.clone(),
        plan_id: plan.id.clone(),
        user_id: user.id.clone(),
        customer_email: Some(user.email.clone()),
        customer_name: Some(user.name.clone()),
        return_url: with_query(
            &callback_base,
            &[
                ("provider", Some(provider.as_str())),
                ("planId", Some(plan.id.as_str())),
                ("userId", Some(user.id.as_str())),
            ],
        ),
        cancel_url: with_query(
            &format!("{}/payment-failed", state.site_url.trim_end_matches('/')),
            &[
                ("planId", Some(plan.id.as_str())),
                ("reason", Some("Payment cancelled")),
                ("status", Some("CANCELLED")),
            ],
        ),
        webhook_url: Some(format!("{}/webhooks/tap", state.base_url.trim_end_matches('/'))),
    };

    let order = match provider {
        PaymentProvider::PayPal => {
            let client = paypal_client(&state)?;
            ensure_currency(client.currency(), &plan.currency)?;
            create_with(client, &payment).await?
        }
        PaymentProvider::Tap => {
            let client = tap_client(&state)?;
            ensure_currency(client.currency(), &plan.currency)?;
            create_with(client, &payment).await?
        }
    };

    let conn = state.db.get()?;
    let transaction = queries::create_transaction(
        &conn,
        &CreateTransaction {
            user_id: user.id.clone(),
            plan_id: plan.id.clone(),
            provider,
            provider_order_id: order.order_id.clone(),
            amount_cents: plan.price_cents,
            currency: plan.currency.clone(),
        },
    )?;

    tracing::info!(
        %provider,
        order_id = %order.order_id,
        transaction_id = %transaction.id,
        user_id = %user.id,
        plan_id = %plan.id,
        "Order created"
    );

    Ok(Json(CreateOrderResponse {
        order_id: order.order_id,
        approve_url: order.approve_url,
        provider,
    }))
}

fn ensure_currency(provider_currency: &str, plan_currency: &str) -> Result<()> {
    if provider_currency.eq_ignore_ascii_case(plan_currency) {
        Ok(())
    } else {
        Err(AppError::BadRequest(msg::CURRENCY_UNSUPPORTED.into()))
    }
}

/// Capture (PayPal) or verify (Tap) an order and settle it.
///
/// The provider's answer is authoritative. Repeated calls for the same order converge
/// on the same transaction and subscription.
pub async fn capture_order(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    Json(request): Json<CaptureOrderRequest>,
) -> Result<Json<CaptureOrderResponse>> {
    let provider = parse_provider(&request.provider)?;
    let order_id = request.order_id.trim();
    if order_id.is_empty() {
        return Err(AppError::BadRequest(msg::MISSING_ORDER_ID.into()));
    }

    if let Some(ref caller) = caller {
        let conn = state.db.get()?;
        let existing = queries::get_transaction_by_order(&conn, order_id)?;
        if existing.is_some_and(|t| t.user_id != caller.id) {
            return Err(AppError::Forbidden(msg::ORDER_NOT_OWNED.into()));
        }
    }

    let capture = match provider {
        PaymentProvider::PayPal => capture_with(paypal_client(&state)?, order_id).await?,
        PaymentProvider::Tap => capture_with(tap_client(&state)?, order_id).await?,
    };

    let settled = {
        let mut conn = state.db.get()?;
        settle_capture(&mut conn, provider, order_id, &capture, None)?
    };

    let (plan_id, user_id) = match settled.attribution {
        Some(a) => (Some(a.plan_id), Some(a.user_id)),
        None => (capture.plan_id.clone(), capture.user_id.clone()),
    };

    if !capture.is_completed() {
        tracing::info!(%provider, order_id, status = %capture.status, "Capture did not complete");
        return Err(PaymentError::CaptureIncomplete {
            status: capture.status,
            capture_id: capture.capture_id,
            plan_id,
            user_id,
        }
        .into());
    }

    tracing::info!(
        %provider,
        order_id,
        capture_id = ?capture.capture_id,
        subscription_created = settled.created,
        "Capture completed"
    );

    Ok(Json(CaptureOrderResponse {
        success: true,
        capture_id: capture.capture_id,
        status: capture.status,
        plan_id,
        user_id,
    }))
}
