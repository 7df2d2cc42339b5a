use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::payments::PaymentProvider;

/// Lifecycle of a provider order/charge as recorded by the backend.
/// `Pending` is the only non-terminal status; terminal rows never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// One payment attempt against a provider. Written as `pending` right after the
/// provider order is created, so abandoned checkouts still leave a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub provider: PaymentProvider,
    pub provider_order_id: String,
    pub capture_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: TransactionStatus,
    /// Last raw status reported by the provider (e.g. "DECLINED")
    pub provider_status: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub user_id: String,
    pub plan_id: String,
    pub provider: PaymentProvider,
    pub provider_order_id: String,
    pub amount_cents: i64,
    pub currency: String,
}

/// Filters for the admin transaction listing
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransactionFilters {
    pub user_id: Option<String>,
    pub plan_id: Option<String>,
    pub provider: Option<PaymentProvider>,
    pub status: Option<TransactionStatus>,
}
