//! Client-side payment attempt state machine.
//!
//! `Checking -> Verifying -> {Completed | Failed | Cancelled}`. Terminal states
//! are sticky. Because the page hosting an attempt can be re-created, completion
//! is also latched in session storage through [`CompletionLatch`].

use crate::error::CheckoutError;
use crate::storage::{StorageAdapter, keys};
use crate::types::Provider;

pub const DEFAULT_MAX_AUTO_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    /// Callback parameters not resolved yet
    Checking,
    /// A capture/verify call has been dispatched
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Bucket a normalised provider status. `None` means non-terminal.
pub fn terminal_state_for(status: &str) -> Option<PaymentState> {
    match status.trim().to_ascii_uppercase().as_str() {
        "COMPLETED" => Some(PaymentState::Completed),
        "FAILED" | "DECLINED" | "VOIDED" => Some(PaymentState::Failed),
        "CANCELLED" => Some(PaymentState::Cancelled),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub provider: Provider,
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    state: PaymentState,
    poll_count: u32,
    retry_count: u32,
    max_auto_retries: u32,
    last_error: Option<CheckoutError>,
    last_status: Option<String>,
}

impl PaymentAttempt {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            plan_id: None,
            user_id: None,
            order_id: None,
            state: PaymentState::Checking,
            poll_count: 0,
            retry_count: 0,
            max_auto_retries: DEFAULT_MAX_AUTO_RETRIES,
            last_error: None,
            last_status: None,
        }
    }

    pub fn with_max_auto_retries(mut self, max: u32) -> Self {
        self.max_auto_retries = max;
        self
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&CheckoutError> {
        self.last_error.as_ref()
    }

    /// Raw provider status from the last capture, kept for diagnostics.
    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Enter `Verifying` for a new dispatch. Returns false (and changes nothing)
    /// once terminal.
    pub fn begin_verification(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = PaymentState::Verifying;
        self.poll_count += 1;
        true
    }

    /// Apply a provider status and return the resulting state.
    pub fn apply_status(&mut self, status: &str) -> PaymentState {
        if self.is_terminal() {
            return self.state;
        }
        self.last_status = Some(status.to_string());
        match terminal_state_for(status) {
            Some(terminal) => {
                self.state = terminal;
                self.last_error = None;
            }
            None => self.state = PaymentState::Verifying,
        }
        self.state
    }

    /// Transient failures keep the attempt in `Verifying`.
    pub fn record_transient_error(&mut self, error: CheckoutError) {
        if self.is_terminal() {
            return;
        }
        self.state = PaymentState::Verifying;
        self.retry_count += 1;
        self.last_error = Some(error);
    }

    /// Errors a retry cannot fix. Kept for the debug panel without touching
    /// the retry budget.
    pub fn record_error(&mut self, error: CheckoutError) {
        if self.is_terminal() {
            return;
        }
        self.state = PaymentState::Verifying;
        self.last_error = Some(error);
    }

    pub fn can_auto_retry(&self) -> bool {
        !self.is_terminal() && self.retry_count < self.max_auto_retries
    }

    /// Retry budget spent without reaching a terminal state.
    pub fn retries_exhausted(&self) -> bool {
        !self.is_terminal() && self.retry_count >= self.max_auto_retries
    }

    /// Buyer closed the provider widget. Lets them start over; any capture
    /// already sent to the server is unaffected.
    pub fn cancel(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.state = PaymentState::Checking;
        self.last_error = None;
    }
}

/// Per-order completion marker in session storage.
pub struct CompletionLatch;

impl CompletionLatch {
    fn key(order_id: &str) -> String {
        format!("{}{}", keys::COMPLETION_PREFIX, order_id)
    }

    pub fn is_latched(storage: &dyn StorageAdapter, order_id: &str) -> bool {
        storage.get(&Self::key(order_id)).is_some()
    }

    /// Latch the order. Returns false if it was already latched.
    pub fn latch(storage: &dyn StorageAdapter, order_id: &str, status: &str) -> bool {
        if Self::is_latched(storage, order_id) {
            return false;
        }
        storage.set(&Self::key(order_id), status);
        true
    }

    pub fn latched_status(storage: &dyn StorageAdapter, order_id: &str) -> Option<String> {
        storage.get(&Self::key(order_id))
    }
}
