use serde::{Deserialize, Serialize};

/// A purchasable subscription plan. `id` is a stable slug (e.g. "basic").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    /// ISO 4217 code, uppercase (e.g. "USD")
    pub currency: String,
    /// Subscription length. None for lifetime plans.
    pub duration_days: Option<i32>,
    pub is_lifetime: bool,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlan {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub duration_days: Option<i32>,
    #[serde(default)]
    pub is_lifetime: bool,
}
