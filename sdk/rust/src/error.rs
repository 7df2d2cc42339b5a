//! Error types for the checkout SDK

use thiserror::Error;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutErrorCode {
    /// Missing or malformed input (400)
    Validation,
    /// Transport failure before a response was received
    Network,
    /// Payment provider not configured on the backend (503)
    Configuration,
    /// The provider rejected or failed the request (502 with `retryable`)
    ProviderRequest,
    /// The provider answered with something unusable
    ProviderResponseInvalid,
    /// Session missing or expired (401/403)
    Authentication,
    NotFound,
    Server,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CheckoutError {
    pub code: CheckoutErrorCode,
    pub message: String,
    /// HTTP status, when the error came from a response
    pub status: Option<u16>,
}

impl CheckoutError {
    pub fn new(code: CheckoutErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(code: CheckoutErrorCode, message: impl Into<String>, status: u16) -> Self {
        Self {
            code,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(CheckoutErrorCode::Validation, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CheckoutErrorCode::Network, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(CheckoutErrorCode::Authentication, message)
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            CheckoutErrorCode::Network | CheckoutErrorCode::ProviderRequest
        )
    }
}

/// Map an HTTP error status (and the backend's `retryable` hint) to an error code.
pub(crate) fn map_status_to_error_code(status: u16, retryable: bool) -> CheckoutErrorCode {
    match status {
        400 | 422 => CheckoutErrorCode::Validation,
        401 | 403 => CheckoutErrorCode::Authentication,
        404 => CheckoutErrorCode::NotFound,
        502 if retryable => CheckoutErrorCode::ProviderRequest,
        502 => CheckoutErrorCode::ProviderResponseInvalid,
        503 => CheckoutErrorCode::Configuration,
        _ => CheckoutErrorCode::Server,
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
