//! Payment provider clients.
//!
//! Both providers implement [`PaymentGateway`]: create an order/charge server-side and
//! later capture/verify it. Provider failures are converted into [`PaymentError`] at this
//! boundary so handlers never see raw HTTP errors.

mod paypal;
mod tap;

pub use paypal::*;
pub use tap::*;

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

use crate::models::TransactionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PaymentProvider {
    PayPal,
    Tap,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::PayPal => "paypal",
            PaymentProvider::Tap => "tap",
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    /// Provider credentials are missing. Fatal for the request, visible to operators only.
    #[error("{provider} is not configured")]
    Configuration { provider: &'static str },

    /// Transport failure or non-2xx answer from the provider. The user may retry.
    #[error("{provider} request failed (status {status:?}): {body}")]
    ProviderRequest {
        provider: &'static str,
        status: Option<u16>,
        body: String,
    },

    /// The provider answered 2xx with a body we cannot interpret.
    #[error("{provider} returned an invalid response: {reason}")]
    ProviderResponseInvalid {
        provider: &'static str,
        reason: String,
        body: String,
    },

    /// The provider reports the payment as declined or not yet final.
    #[error("payment not completed (status {status})")]
    CaptureIncomplete {
        status: String,
        capture_id: Option<String>,
        plan_id: Option<String>,
        user_id: Option<String>,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::ProviderRequest { .. })
    }
}

/// Input for creating a provider order/charge.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub amount_cents: i64,
    pub currency: String,
    pub plan_id: String,
    pub user_id: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    /// Where the provider sends the buyer after approval
    pub return_url: String,
    pub cancel_url: String,
    /// Server-to-server notification URL (Tap only)
    pub webhook_url: Option<String>,
}

/// Result of creating an order/charge with a provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderOrder {
    pub order_id: String,
    /// Hosted page where the buyer approves the payment
    pub approve_url: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayerInfo {
    pub payer_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Result of capturing or verifying an order/charge.
#[derive(Debug, Clone)]
pub struct ProviderCapture {
    /// Normalized status (see [`normalize_status`])
    pub status: String,
    pub capture_id: Option<String>,
    pub payer: Option<PayerInfo>,
    /// Attribution carried in provider metadata, used when no local record exists
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
    pub raw: serde_json::Value,
}

impl ProviderCapture {
    /// Terminal transaction status for this capture, or `None` while still in flight.
    pub fn outcome(&self) -> Option<TransactionStatus> {
        status_outcome(&self.status)
    }

    pub fn is_completed(&self) -> bool {
        self.outcome() == Some(TransactionStatus::Completed)
    }
}

/// Shared contract of the PayPal and Tap clients.
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    fn create_payment(
        &self,
        request: &CreatePayment,
    ) -> impl Future<Output = Result<ProviderOrder, PaymentError>> + Send;

    fn capture_payment(
        &self,
        order_id: &str,
    ) -> impl Future<Output = Result<ProviderCapture, PaymentError>> + Send;
}

/// Map provider-specific status strings onto the vocabulary used by the rest of the
/// system: COMPLETED, FAILED, DECLINED, VOIDED, CANCELLED. Unknown values pass through
/// uppercased and are treated as non-terminal.
pub fn normalize_status(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.as_str() {
        "CAPTURED" => "COMPLETED".to_string(),
        "VOID" => "VOIDED".to_string(),
        "ABANDONED" => "CANCELLED".to_string(),
        "RESTRICTED" => "DECLINED".to_string(),
        "TIMEDOUT" | "UNKNOWN" => "FAILED".to_string(),
        _ => upper,
    }
}

/// Terminal outcome for a normalized status string.
pub fn status_outcome(status: &str) -> Option<TransactionStatus> {
    match status {
        "COMPLETED" => Some(TransactionStatus::Completed),
        "FAILED" | "DECLINED" | "VOIDED" => Some(TransactionStatus::Failed),
        "CANCELLED" => Some(TransactionStatus::Cancelled),
        _ => None,
    }
}

/// Convert a decimal amount from a request into minor units.
pub fn amount_to_cents(amount: f64) -> Option<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        return None;
    }
    Some((amount * 100.0).round() as i64)
}

/// Format minor units as a decimal string ("9.99").
pub fn format_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Read a provider response: non-2xx becomes `ProviderRequest`, an unparseable body
/// becomes `ProviderResponseInvalid` with the raw text kept for diagnosis.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| PaymentError::ProviderRequest {
        provider,
        status: Some(status.as_u16()),
        body: e.to_string(),
    })?;

    if !status.is_success() {
        return Err(PaymentError::ProviderRequest {
            provider,
            status: Some(status.as_u16()),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| PaymentError::ProviderResponseInvalid {
        provider,
        reason: e.to_string(),
        body,
    })
}

pub(crate) fn transport_error(provider: &'static str, err: reqwest::Error) -> PaymentError {
    PaymentError::ProviderRequest {
        provider,
        status: err.status().map(|s| s.as_u16()),
        body: err.to_string(),
    }
}
