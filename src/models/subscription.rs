use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

/// Access granted by a settled payment. At most one row per provider charge id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub provider_charge_id: String,
    pub status: SubscriptionStatus,
    pub start_date: i64,
    /// None for lifetime subscriptions
    pub end_date: Option<i64>,
    pub is_lifetime: bool,
    pub created_at: i64,
    pub cancelled_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub user_id: String,
    pub plan_id: String,
    pub provider_charge_id: String,
    pub start_date: i64,
    pub end_date: Option<i64>,
    pub is_lifetime: bool,
}
