use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::payments::PaymentError;

/// User-facing error messages shared across handlers.
pub mod msg {
    pub const PLAN_NOT_FOUND: &str = "Plan not found";
    pub const USER_NOT_FOUND: &str = "User not found";
    pub const INVALID_PROVIDER: &str = "Invalid provider. Use 'paypal' or 'tap'";
    pub const MISSING_ORDER_ID: &str = "orderId is required";
    pub const MISSING_CHARGE_ID: &str = "chargeId is required";
    pub const MISSING_PLAN_ID: &str = "planId is required";
    pub const MISSING_USER_ID: &str = "userId is required";
    pub const INVALID_AMOUNT: &str = "amount must be a positive number";
    pub const AMOUNT_MISMATCH: &str = "amount does not match the plan price";
    pub const PLAN_INACTIVE: &str = "Plan is not available for purchase";
    pub const USER_MISMATCH: &str = "userId does not match the authenticated user";
    pub const CURRENCY_UNSUPPORTED: &str = "Plan currency is not supported by this provider";
    pub const ORDER_NOT_OWNED: &str = "Order belongs to another user";
    pub const INVALID_REFRESH_TOKEN: &str = "Invalid or expired refresh token";
    pub const EMAIL_TAKEN: &str = "A user with this email already exists";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

/// Body returned when the provider reports a capture that did not complete.
/// Same shape as a successful capture so clients can route on `status`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IncompleteCaptureResponse {
    success: bool,
    capture_id: Option<String>,
    status: String,
    plan_id: Option<String>,
    user_id: Option<String>,
}

impl From<StatusCode> for AppError {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::UNAUTHORIZED => AppError::Unauthorized,
            StatusCode::FORBIDDEN => AppError::Forbidden("Access denied".into()),
            StatusCode::NOT_FOUND => AppError::NotFound("Resource not found".into()),
            _ => AppError::Internal(format!("Status: {}", code)),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    fn payment_response(err: &PaymentError) -> Response {
        let (status, error, details, retryable) = match err {
            PaymentError::Configuration { provider } => {
                tracing::error!(provider, "Payment provider credentials are not configured");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Payment provider unavailable",
                    None,
                    false,
                )
            }
            PaymentError::ProviderRequest {
                provider,
                status,
                body,
            } => {
                tracing::warn!(provider, ?status, body = %body, "Payment provider request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment provider request failed",
                    Some("Please try again".to_string()),
                    true,
                )
            }
            PaymentError::ProviderResponseInvalid {
                provider,
                reason,
                body,
            } => {
                tracing::error!(provider, reason = %reason, body = %body, "Invalid payment provider response");
                (StatusCode::BAD_GATEWAY, "Payment failed", None, false)
            }
            PaymentError::CaptureIncomplete {
                status,
                capture_id,
                plan_id,
                user_id,
            } => {
                let body = IncompleteCaptureResponse {
                    success: false,
                    capture_id: capture_id.clone(),
                    status: status.clone(),
                    plan_id: plan_id.clone(),
                    user_id: user_id.clone(),
                };
                return (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response();
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            retryable,
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::Payment(err) => return Self::payment_response(err),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            retryable: false,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Converts `Option<T>` lookups into `AppError::NotFound`.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.to_string()))
    }
}
