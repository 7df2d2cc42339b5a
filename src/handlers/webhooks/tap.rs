use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::payments::{PaymentProvider, TapCharge};
use crate::settlement::settle_webhook_capture;

const SIGNATURE_HEADER: &str = "hashstring";

/// Tap charge webhook.
///
/// The body is a charge object signed with the `hashstring` header. Each
/// (charge, status) pair is processed once; replays answer 200 without side effects.
pub async fn handle_tap_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(client) = state.tap.as_ref() else {
        tracing::warn!("Tap webhook received but Tap is not configured");
        return (StatusCode::SERVICE_UNAVAILABLE, "Tap not configured");
    };

    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return (StatusCode::UNAUTHORIZED, "Missing signature");
    };

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Tap webhook: invalid JSON: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };
    let charge = match TapCharge::parse(&raw) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Tap webhook: unexpected payload: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid charge payload");
        }
    };

    if !client.verify_webhook_signature(&charge, signature) {
        tracing::warn!(charge_id = %charge.id, "Tap webhook rejected: invalid signature");
        return (StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Tap webhook: failed to get db connection: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let event_id = format!("{}:{}", charge.id, charge.status);
    let charge_id = charge.id.clone();
    let capture = charge.into_capture(raw);
    match settle_webhook_capture(&mut conn, PaymentProvider::Tap, &event_id, &charge_id, &capture) {
        Ok(Some(result)) => {
            tracing::info!(
                charge_id = %charge_id,
                status = %capture.status,
                subscription_created = result.created,
                "Tap webhook processed"
            );
            (StatusCode::OK, "OK")
        }
        Ok(None) => {
            tracing::debug!(event_id = %event_id, "Tap webhook already processed");
            (StatusCode::OK, "Already processed")
        }
        Err(e) => {
            // Nothing was recorded, so Tap's retry is processed in full.
            tracing::error!(charge_id = %charge_id, "Tap webhook settlement failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Settlement failed")
        }
    }
}
