use axum::extract::State;
use serde::Deserialize;

use crate::db::AppState;
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::payments::PaymentProvider;
use crate::settlement::settle_capture;

use super::orders::tap_client;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTapRequest {
    #[serde(alias = "tap_id", alias = "charge_id")]
    pub charge_id: String,
}

/// Retrieve a Tap charge and return the provider payload unchanged.
///
/// Terminal charges are settled on the way through, so a buyer returning from the
/// hosted page gets their subscription even if the webhook has not arrived yet.
pub async fn verify_tap_charge(
    State(state): State<AppState>,
    Json(request): Json<VerifyTapRequest>,
) -> Result<Json<serde_json::Value>> {
    let charge_id = request.charge_id.trim();
    if charge_id.is_empty() {
        return Err(AppError::BadRequest(msg::MISSING_CHARGE_ID.into()));
    }

    let client = tap_client(&state)?;
    let (charge, raw) = client.retrieve_charge(charge_id).await?;
    let capture = charge.into_capture(raw.clone());

    let settled = {
        let mut conn = state.db.get()?;
        settle_capture(&mut conn, PaymentProvider::Tap, charge_id, &capture, None)?
    };

    tracing::info!(
        charge_id,
        status = %capture.status,
        subscription_created = settled.created,
        "Tap charge verified"
    );

    Ok(Json(raw))
}
