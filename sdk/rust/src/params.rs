//! Callback URL parameter extraction.
//!
//! Providers and our own redirect URLs spell the same identifiers differently
//! (`token` vs `orderId` vs `tap_id`). Each logical field has an ordered list of
//! candidate keys; the first non-empty match wins.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CheckoutError, Result};
use crate::storage::{StorageAdapter, keys};

pub const ORDER_ID_KEYS: &[&str] = &["token", "orderId", "order_id", "tap_id"];
pub const TOKEN_KEYS: &[&str] = &["token"];
pub const PAYER_ID_KEYS: &[&str] = &["PayerID", "payer_id"];
pub const PAYMENT_ID_KEYS: &[&str] = &["paymentId", "payment_id"];
pub const PLAN_ID_KEYS: &[&str] = &["planId", "plan_id"];
pub const USER_ID_KEYS: &[&str] = &["userId", "user_id"];
pub const SUCCESS_KEYS: &[&str] = &["success", "payment_status"];

/// Identifiers remembered across reloads of the callback page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackSnapshot {
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
    pub order_id: Option<String>,
}

impl CallbackSnapshot {
    pub fn load(storage: &dyn StorageAdapter) -> Option<Self> {
        let raw = storage.get(keys::CALLBACK_SNAPSHOT)?;
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::debug!("Discarding unreadable callback snapshot: {}", e);
                storage.remove(keys::CALLBACK_SNAPSHOT);
                None
            }
        }
    }

    fn save(&self, storage: &dyn StorageAdapter) {
        match serde_json::to_string(self) {
            Ok(json) => storage.set(keys::CALLBACK_SNAPSHOT, &json),
            Err(e) => tracing::warn!("Failed to serialize callback snapshot: {}", e),
        }
    }

    pub fn clear(storage: &dyn StorageAdapter) {
        storage.remove(keys::CALLBACK_SNAPSHOT);
    }
}

/// Marks that a checkout was started from this browser tab.
pub fn mark_pending_payment(storage: &dyn StorageAdapter, order_id: &str) {
    storage.set(keys::PENDING_PAYMENT, order_id);
}

pub fn pending_payment(storage: &dyn StorageAdapter) -> Option<String> {
    storage.get(keys::PENDING_PAYMENT)
}

/// Normalised view of a provider callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
    pub token: Option<String>,
    pub payer_id: Option<String>,
    /// Client-supplied success flag. A hint for display only; never grants access.
    pub success: Option<bool>,
    pub has_session_independent_data: bool,
    pub is_valid_payment_callback: bool,
}

fn lookup(pairs: &[(String, String)], candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
    })
}

fn parse_success_hint(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "success" | "succeeded" | "completed" | "captured" | "paid" => {
            Some(true)
        }
        "false" | "0" | "no" | "failed" | "declined" | "cancelled" | "canceled" | "voided" => {
            Some(false)
        }
        _ => None,
    }
}

impl CallbackParams {
    /// Extract callback parameters from query pairs, falling back to the snapshot
    /// in `storage` for plan and user ids.
    pub fn extract<I, K, V>(query: I, storage: &dyn StorageAdapter) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs: Vec<(String, String)> = query
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let url_plan = lookup(&pairs, PLAN_ID_KEYS);
        let url_user = lookup(&pairs, USER_ID_KEYS);
        let order_id = lookup(&pairs, ORDER_ID_KEYS);
        let token = lookup(&pairs, TOKEN_KEYS);
        let payer_id = lookup(&pairs, PAYER_ID_KEYS);
        let payment_id = lookup(&pairs, PAYMENT_ID_KEYS);
        let success = lookup(&pairs, SUCCESS_KEYS).and_then(|v| parse_success_hint(&v));

        let previous = CallbackSnapshot::load(storage).unwrap_or_default();

        if url_plan.is_some() || url_user.is_some() || order_id.is_some() {
            let snapshot = CallbackSnapshot {
                plan_id: url_plan.clone().or_else(|| previous.plan_id.clone()),
                user_id: url_user.clone().or_else(|| previous.user_id.clone()),
                order_id: order_id.clone().or_else(|| previous.order_id.clone()),
            };
            snapshot.save(storage);
        }

        let plan_id = url_plan.or(previous.plan_id);
        let user_id = url_user.or(previous.user_id);

        let has_session_independent_data = token.is_some()
            || payer_id.is_some()
            || payment_id.is_some()
            || order_id.is_some();
        let is_valid_payment_callback =
            has_session_independent_data && (plan_id.is_some() || user_id.is_some());

        if is_valid_payment_callback {
            CallbackSnapshot::clear(storage);
            storage.remove(keys::PENDING_PAYMENT);
        }

        Self {
            plan_id,
            user_id,
            payment_id,
            order_id,
            token,
            payer_id,
            success,
            has_session_independent_data,
            is_valid_payment_callback,
        }
    }

    /// Parse a full callback URL.
    pub fn from_url(url: &str, storage: &dyn StorageAdapter) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|_| CheckoutError::validation("Invalid callback URL"))?;
        Ok(Self::extract(parsed.query_pairs().into_owned(), storage))
    }
}
