//! Type definitions for the checkout SDK

use serde::{Deserialize, Serialize};

/// Payment provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    PayPal,
    Tap,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayPal => "paypal",
            Self::Tap => "tap",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signed-in storefront user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Access/refresh token pair issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// A live session: tokens plus the user they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub access_expires_at: Option<i64>,
    pub user: SessionUser,
}

impl AuthSession {
    pub fn tokens(&self) -> SessionTokens {
        SessionTokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderParams {
    pub provider: Provider,
    /// Major units, e.g. `9.99`
    pub amount: f64,
    pub plan_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    pub order_id: String,
    /// Hosted page to send the buyer to (PayPal approve link or Tap transaction url)
    pub approve_url: Option<String>,
    pub provider: Provider,
}

/// Outcome of a capture. Returned for both completed and incomplete captures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub success: bool,
    pub capture_id: Option<String>,
    /// Normalised provider status (`COMPLETED`, `DECLINED`, ...)
    pub status: String,
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub provider: Provider,
    pub order_id: String,
    /// `pending`, `completed`, `failed` or `cancelled`
    pub status: String,
    #[serde(default)]
    pub provider_status: Option<String>,
    #[serde(default)]
    pub capture_id: Option<String>,
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    pub created_at: i64,
}

impl TransactionInfo {
    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub id: String,
    pub plan_id: String,
    pub status: String,
    pub start_date: i64,
    pub end_date: Option<i64>,
    pub is_lifetime: bool,
}

/// Result of a transaction recovery lookup. Both halves may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransactionLookup {
    pub transaction: Option<TransactionInfo>,
    pub subscription: Option<SubscriptionInfo>,
}
