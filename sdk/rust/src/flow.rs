//! The payment callback page, end to end.
//!
//! Extracted callback parameters drive: transaction recovery, session
//! restoration, capture dispatch, status application and a single navigation.

use std::sync::Arc;
use std::time::Duration;

use crate::client::CheckoutApi;
use crate::error::{CheckoutError, CheckoutErrorCode};
use crate::params::CallbackParams;
use crate::router::{Destination, Navigator, RouteIds, StatusRouter};
use crate::session::{AuthBackend, DEFAULT_MAX_RESTORE_ATTEMPTS, RestoreOutcome, SessionRestorer};
use crate::state::{CompletionLatch, DEFAULT_MAX_AUTO_RETRIES, PaymentAttempt, PaymentState};
use crate::storage::StorageAdapter;
use crate::types::{CaptureResult, Provider, SessionUser, TransactionLookup};

pub const SUPPORT_MESSAGE: &str =
    "We could not confirm your payment. Please contact support and include your order reference.";
pub const STILL_PROCESSING_MESSAGE: &str =
    "Your payment is still being processed. Please check back in a moment.";

#[derive(Debug, Clone)]
pub struct VerifierOptions {
    pub max_restore_attempts: u32,
    pub max_auto_retries: u32,
    /// Captures to try while the provider reports a non-terminal status
    pub max_polls: u32,
    pub retry_delay: Duration,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            max_restore_attempts: DEFAULT_MAX_RESTORE_ATTEMPTS,
            max_auto_retries: DEFAULT_MAX_AUTO_RETRIES,
            max_polls: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// What happened on one pass over the callback.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub state: PaymentState,
    pub order_id: Option<String>,
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
    pub restore: Option<RestoreOutcome>,
    pub transaction: Option<TransactionLookup>,
    pub capture: Option<CaptureResult>,
    pub destination: Option<Destination>,
    /// Message for the buyer when verification could not finish
    pub user_message: Option<String>,
    /// Raw error for the debug panel
    pub debug_error: Option<CheckoutError>,
}

impl VerificationReport {
    fn checking(order_id: Option<String>) -> Self {
        Self {
            state: PaymentState::Checking,
            order_id,
            plan_id: None,
            user_id: None,
            restore: None,
            transaction: None,
            capture: None,
            destination: None,
            user_message: None,
            debug_error: None,
        }
    }
}

/// Tap charge ids start with `chg_`; everything else is a PayPal order.
pub fn infer_provider(order_id: &str) -> Provider {
    if order_id.starts_with("chg_") {
        Provider::Tap
    } else {
        Provider::PayPal
    }
}

pub struct PaymentVerifier<C> {
    client: Arc<C>,
    local_storage: Arc<dyn StorageAdapter>,
    session_storage: Arc<dyn StorageAdapter>,
    navigator: Arc<dyn Navigator>,
    restorer: SessionRestorer,
    router: StatusRouter,
    options: VerifierOptions,
}

impl<C: CheckoutApi + AuthBackend> PaymentVerifier<C> {
    pub fn new(
        client: Arc<C>,
        local_storage: Arc<dyn StorageAdapter>,
        session_storage: Arc<dyn StorageAdapter>,
        navigator: Arc<dyn Navigator>,
        options: VerifierOptions,
    ) -> Self {
        Self {
            client,
            local_storage,
            session_storage,
            navigator,
            restorer: SessionRestorer::new(options.max_restore_attempts),
            router: StatusRouter::new(),
            options,
        }
    }

    pub fn has_navigated(&self) -> bool {
        self.router.has_navigated()
    }

    /// Parse `url` and [`verify`](Self::verify) it.
    pub async fn verify_url(
        &mut self,
        url: &str,
        current_user: Option<&SessionUser>,
    ) -> VerificationReport {
        match CallbackParams::from_url(url, self.session_storage.as_ref()) {
            Ok(params) => {
                let provider = url::Url::parse(url).ok().and_then(|u| {
                    u.query_pairs()
                        .find(|(k, _)| k == "provider")
                        .and_then(|(_, v)| match v.to_ascii_lowercase().as_str() {
                            "paypal" => Some(Provider::PayPal),
                            "tap" => Some(Provider::Tap),
                            _ => None,
                        })
                });
                self.verify(&params, provider, current_user).await
            }
            Err(e) => {
                let mut report = VerificationReport::checking(None);
                report.debug_error = Some(e);
                report
            }
        }
    }

    pub async fn verify(
        &mut self,
        params: &CallbackParams,
        provider: Option<Provider>,
        current_user: Option<&SessionUser>,
    ) -> VerificationReport {
        let order_id = params.order_id.clone();
        if !params.is_valid_payment_callback {
            tracing::debug!("Not a payment callback yet");
            return VerificationReport::checking(order_id);
        }
        let Some(order_id) = order_id else {
            let mut report = VerificationReport::checking(None);
            report.debug_error = Some(CheckoutError::validation("Callback carries no order id"));
            return report;
        };

        let mut report = VerificationReport::checking(Some(order_id.clone()));

        if let Some(status) = CompletionLatch::latched_status(self.session_storage.as_ref(), &order_id) {
            tracing::debug!(%order_id, %status, "Order already handled");
            let mut attempt = PaymentAttempt::new(provider.unwrap_or_else(|| infer_provider(&order_id)));
            attempt.begin_verification();
            report.state = attempt.apply_status(&status);
            return report;
        }

        let provider = provider.unwrap_or_else(|| infer_provider(&order_id));

        // Recovery first: its owner is the attribution of last resort.
        let (transaction, live_token) = self.recover_transaction(&order_id).await;
        let recovered = transaction.as_ref().and_then(|t| t.transaction.as_ref());
        let owner = recovered.map(|t| t.user_id.clone());

        let restore = self
            .restorer
            .restore(
                self.client.as_ref(),
                self.local_storage.as_ref(),
                current_user,
                owner.as_deref(),
            )
            .await;

        report.plan_id = params
            .plan_id
            .clone()
            .or_else(|| recovered.map(|t| t.plan_id.clone()));
        report.user_id = current_user
            .map(|u| u.id.clone())
            .or_else(|| restore.user_id().map(str::to_string))
            .or_else(|| params.user_id.clone())
            .or(owner);
        // Send only a session the backend accepted on this pass. A rejected
        // token turns an otherwise valid anonymous capture into a 401.
        let mut capture_token = match &restore {
            RestoreOutcome::Restored(_) => self.client.bearer_token().await,
            RestoreOutcome::NotNeeded => live_token,
            _ => None,
        };
        report.restore = Some(restore);
        report.transaction = transaction;

        let mut attempt = PaymentAttempt::new(provider)
            .with_max_auto_retries(self.options.max_auto_retries);
        attempt.order_id = Some(order_id.clone());
        attempt.plan_id = report.plan_id.clone();
        attempt.user_id = report.user_id.clone();

        loop {
            attempt.begin_verification();
            match self
                .client
                .capture_order(provider, &order_id, capture_token.as_deref())
                .await
            {
                Ok(capture) => {
                    let state = attempt.apply_status(&capture.status);
                    report.capture = Some(capture.clone());
                    if state.is_terminal() {
                        self.finish(&mut report, &attempt, &capture, params);
                        break;
                    }
                    if attempt.poll_count() >= self.options.max_polls {
                        report.user_message = Some(STILL_PROCESSING_MESSAGE.to_string());
                        break;
                    }
                    tracing::debug!(%order_id, status = %capture.status, "Capture not final yet");
                }
                Err(e) if e.code == CheckoutErrorCode::Authentication && capture_token.is_some() => {
                    tracing::info!(%order_id, "Session rejected by capture, retrying anonymously");
                    capture_token = None;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(%order_id, code = ?e.code, "Capture failed: {}", e);
                    let stop = if e.is_retryable() {
                        attempt.record_transient_error(e);
                        !attempt.can_auto_retry()
                    } else {
                        attempt.record_error(e);
                        true
                    };
                    if stop {
                        report.user_message = Some(SUPPORT_MESSAGE.to_string());
                        report.debug_error = attempt.last_error().cloned();
                        break;
                    }
                }
            }
            tokio::time::sleep(self.options.retry_delay).await;
        }

        report.state = attempt.state();
        report
    }

    /// Look the order up, scoped to the stored session when there is one.
    /// Returns the lookup and the token if the backend still accepts it.
    async fn recover_transaction(
        &self,
        order_id: &str,
    ) -> (Option<TransactionLookup>, Option<String>) {
        let token = self.client.bearer_token().await;
        let lookup = self.client.find_transaction_by_order(order_id, token.as_deref()).await;
        let (lookup, token) = match lookup {
            Err(e) if e.code == CheckoutErrorCode::Authentication && token.is_some() => {
                tracing::info!(%order_id, "Session rejected by recovery, looking up anonymously");
                let lookup = self.client.find_transaction_by_order(order_id, None).await;
                (lookup, None)
            }
            other => (other, token),
        };
        match lookup {
            Ok(lookup) => (lookup, token),
            Err(e) => {
                tracing::warn!(%order_id, "Transaction recovery failed: {}", e);
                (None, token)
            }
        }
    }

    fn finish(
        &self,
        report: &mut VerificationReport,
        attempt: &PaymentAttempt,
        capture: &CaptureResult,
        params: &CallbackParams,
    ) {
        let order_id = attempt.order_id.as_deref().unwrap_or_default();
        if !CompletionLatch::latch(self.session_storage.as_ref(), order_id, &capture.status) {
            return;
        }

        let payment_id = if attempt.state() == PaymentState::Completed {
            capture.capture_id.clone()
        } else {
            params.payment_id.clone()
        };
        let ids = RouteIds {
            plan_id: report.plan_id.clone().or_else(|| capture.plan_id.clone()),
            user_id: report.user_id.clone().or_else(|| capture.user_id.clone()),
            payment_id,
        };
        report.destination = self.router.route(self.navigator.as_ref(), &capture.status, &ids);
    }
}

/// Whether a failed verification should offer the buyer a retry button.
pub fn offers_retry(report: &VerificationReport) -> bool {
    !report.state.is_terminal()
        && report
            .debug_error
            .as_ref()
            .is_some_and(|e| e.is_retryable() || e.code == CheckoutErrorCode::Authentication)
}

impl<C> std::fmt::Debug for PaymentVerifier<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentVerifier")
            .field("restore_attempts", &self.restorer.attempts())
            .field("navigated", &self.router.has_navigated())
            .finish()
    }
}
