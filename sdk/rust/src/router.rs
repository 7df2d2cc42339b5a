//! Maps a terminal payment status to the success or failure page.

use std::sync::atomic::{AtomicBool, Ordering};

pub const SUCCESS_PATH: &str = "/payment-success";
pub const FAILURE_PATH: &str = "/payment-failed";

/// Identifiers carried to the destination page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteIds {
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Success {
        plan_id: Option<String>,
        user_id: Option<String>,
        payment_id: Option<String>,
    },
    Failure {
        plan_id: Option<String>,
        reason: String,
        /// Provider status, preserved for diagnostics
        status: String,
        payment_id: Option<String>,
    },
}

fn failure_reason(status: &str) -> &'static str {
    match status {
        "DECLINED" => "Payment declined",
        "CANCELLED" => "Payment cancelled",
        "VOIDED" => "Payment voided",
        _ => "Payment failed",
    }
}

fn push_param(query: &mut Vec<String>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        query.push(format!("{}={}", key, urlencoding::encode(value)));
    }
}

impl Destination {
    /// `None` for non-terminal statuses.
    pub fn for_status(status: &str, ids: &RouteIds) -> Option<Self> {
        let status = status.trim().to_ascii_uppercase();
        match status.as_str() {
            "COMPLETED" => Some(Self::Success {
                plan_id: ids.plan_id.clone(),
                user_id: ids.user_id.clone(),
                payment_id: ids.payment_id.clone(),
            }),
            "FAILED" | "CANCELLED" | "DECLINED" | "VOIDED" => Some(Self::Failure {
                plan_id: ids.plan_id.clone(),
                reason: failure_reason(&status).to_string(),
                payment_id: ids.payment_id.clone(),
                status,
            }),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Relative path with query, e.g. `/payment-success?planId=basic&userId=u1`.
    /// Empty values are omitted; spaces encode as `%20`.
    pub fn path(&self) -> String {
        let mut query = Vec::new();
        let base = match self {
            Self::Success {
                plan_id,
                user_id,
                payment_id,
            } => {
                push_param(&mut query, "planId", plan_id.as_deref());
                push_param(&mut query, "userId", user_id.as_deref());
                push_param(&mut query, "payment_id", payment_id.as_deref());
                SUCCESS_PATH
            }
            Self::Failure {
                plan_id,
                reason,
                status,
                payment_id,
            } => {
                push_param(&mut query, "planId", plan_id.as_deref());
                push_param(&mut query, "reason", Some(reason));
                push_param(&mut query, "status", Some(status));
                push_param(&mut query, "payment_id", payment_id.as_deref());
                FAILURE_PATH
            }
        };

        if query.is_empty() {
            base.to_string()
        } else {
            format!("{}?{}", base, query.join("&"))
        }
    }
}

/// Performs the actual navigation (window.location, a webview, a test recorder).
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigates at most once.
#[derive(Debug, Default)]
pub struct StatusRouter {
    navigated: AtomicBool,
}

impl StatusRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_navigated(&self) -> bool {
        self.navigated.load(Ordering::SeqCst)
    }

    /// Navigate for a terminal status. Returns the destination when navigation
    /// happened; `None` for non-terminal statuses or when already latched.
    pub fn route(
        &self,
        navigator: &dyn Navigator,
        status: &str,
        ids: &RouteIds,
    ) -> Option<Destination> {
        let destination = Destination::for_status(status, ids)?;
        if self.navigated.swap(true, Ordering::SeqCst) {
            tracing::debug!(status, "Navigation already dispatched, ignoring");
            return None;
        }
        let path = destination.path();
        tracing::info!(%path, "Routing payment result");
        navigator.navigate(&path);
        Some(destination)
    }
}
