//! HTTP client for the JojoPrompts payments backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;

use crate::error::{CheckoutError, CheckoutErrorCode, Result, map_status_to_error_code};
use crate::events::{AuthEvent, AuthEvents};
use crate::session::AuthBackend;
use crate::types::{
    AuthSession, CaptureResult, CreateOrderParams, OrderResult, Provider, SessionTokens,
    SessionUser, TransactionLookup,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend calls the verification flow depends on.
pub trait CheckoutApi: Send + Sync {
    /// Captures as the caller when `access_token` is given, anonymously
    /// otherwise.
    fn capture_order(
        &self,
        provider: Provider,
        order_id: &str,
        access_token: Option<&str>,
    ) -> impl Future<Output = Result<CaptureResult>> + Send;

    /// Raw Tap charge payload.
    fn verify_tap(&self, charge_id: &str) -> impl Future<Output = Result<serde_json::Value>> + Send;

    /// `Ok(None)` when no transaction exists yet for `order_id`. Scoped to the
    /// caller when `access_token` is given.
    fn find_transaction_by_order(
        &self,
        order_id: &str,
        access_token: Option<&str>,
    ) -> impl Future<Output = Result<Option<TransactionLookup>>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    details: Option<String>,
    #[serde(default)]
    retryable: bool,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    user: SessionUser,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CaptureBody<'a> {
    provider: Provider,
    order_id: &'a str,
}

pub struct CheckoutClient {
    base_url: String,
    http: HttpClient,
    session: RwLock<Option<AuthSession>>,
    events: Arc<AuthEvents>,
}

impl CheckoutClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_events(base_url, Arc::new(AuthEvents::new()))
    }

    /// Client that reports sign-in/refresh/sign-out on `events`.
    pub fn with_events(base_url: &str, events: Arc<AuthEvents>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CheckoutError::validation("base_url is required"));
        }

        let http = HttpClient::builder()
            .user_agent(concat!("jojoprompts-sdk-rust/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| CheckoutError::network(e.to_string()))?;

        Ok(Self {
            base_url,
            http,
            session: RwLock::new(None),
            events,
        })
    }

    pub fn events(&self) -> &Arc<AuthEvents> {
        &self.events
    }

    // ==================== Session ====================

    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.access_token.clone())
    }

    pub async fn set_session(&self, session: AuthSession) {
        let user = session.user.clone();
        *self.session.write().await = Some(session);
        self.events.emit(&AuthEvent::SignedIn(user));
    }

    pub async fn sign_out(&self) {
        let had_session = self.session.write().await.take().is_some();
        if had_session {
            self.events.emit(&AuthEvent::SignedOut);
        }
    }

    /// `GET /auth/session`
    pub async fn fetch_session(&self, access_token: &str) -> Result<SessionUser> {
        let body: SessionBody = self.get("/auth/session", Some(access_token)).await?;
        Ok(body.user)
    }

    /// `POST /auth/session/refresh`. The refresh token is consumed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        if refresh_token.is_empty() {
            return Err(CheckoutError::validation("refresh_token is required"));
        }
        self.post(
            "/auth/session/refresh",
            &serde_json::json!({ "refreshToken": refresh_token }),
            None,
        )
        .await
    }

    // ==================== Payments ====================

    /// `POST /orders`
    pub async fn create_order(&self, params: &CreateOrderParams) -> Result<OrderResult> {
        if params.plan_id.is_empty() || params.user_id.is_empty() {
            return Err(CheckoutError::validation("plan_id and user_id are required"));
        }
        let token = self.access_token().await;
        self.post("/orders", params, token.as_deref()).await
    }

    // ==================== HTTP ====================

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T> {
        let mut request = self.http.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CheckoutError::network(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T> {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CheckoutError::network(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
                error: Some("Unknown error".to_string()),
                details: None,
                retryable: false,
            });

            let message = match (&body.error, &body.details) {
                (Some(err), Some(details)) => format!("{}: {}", err, details),
                (Some(err), None) => err.clone(),
                (None, Some(details)) => details.clone(),
                (None, None) => format!("Request failed: {}", status),
            };
            let code = map_status_to_error_code(status, body.retryable);

            return Err(CheckoutError::with_status(code, message, status));
        }

        response.json().await.map_err(|e| {
            CheckoutError::new(
                CheckoutErrorCode::ProviderResponseInvalid,
                format!("Unexpected response body: {}", e),
            )
        })
    }
}

impl CheckoutApi for CheckoutClient {
    /// `POST /orders/capture`. A 402 still carries a capture body and is
    /// returned as a non-successful [`CaptureResult`].
    async fn capture_order(
        &self,
        provider: Provider,
        order_id: &str,
        access_token: Option<&str>,
    ) -> Result<CaptureResult> {
        if order_id.is_empty() {
            return Err(CheckoutError::validation("order_id is required"));
        }

        let mut request = self
            .http
            .post(self.url("/orders/capture"))
            .json(&CaptureBody { provider, order_id });
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CheckoutError::network(e.to_string()))?;

        if response.status() == StatusCode::PAYMENT_REQUIRED {
            return response.json().await.map_err(|e| {
                CheckoutError::new(
                    CheckoutErrorCode::ProviderResponseInvalid,
                    format!("Unexpected capture body: {}", e),
                )
            });
        }

        Self::handle_response(response).await
    }

    /// `POST /tap/verify`
    async fn verify_tap(&self, charge_id: &str) -> Result<serde_json::Value> {
        if charge_id.is_empty() {
            return Err(CheckoutError::validation("charge_id is required"));
        }
        self.post(
            "/tap/verify",
            &serde_json::json!({ "chargeId": charge_id }),
            None,
        )
        .await
    }

    /// `GET /transactions/by-order/{order_id}`
    async fn find_transaction_by_order(
        &self,
        order_id: &str,
        access_token: Option<&str>,
    ) -> Result<Option<TransactionLookup>> {
        if order_id.is_empty() {
            return Err(CheckoutError::validation("order_id is required"));
        }
        let path = format!("/transactions/by-order/{}", urlencoding::encode(order_id));
        let lookup: TransactionLookup = match self.get(&path, access_token).await {
            Ok(lookup) => lookup,
            Err(e) if e.code == CheckoutErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if lookup.transaction.is_none() && lookup.subscription.is_none() {
            return Ok(None);
        }
        Ok(Some(lookup))
    }
}

impl AuthBackend for CheckoutClient {
    async fn current_session(&self) -> Result<Option<SessionUser>> {
        let Some(token) = self.access_token().await else {
            return Ok(None);
        };
        match self.fetch_session(&token).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.code == CheckoutErrorCode::Authentication => {
                tracing::debug!("Stored session rejected, signing out");
                self.sign_out().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn bearer_token(&self) -> Option<String> {
        self.access_token().await
    }

    async fn restore_session(&self, tokens: &SessionTokens) -> Result<AuthSession> {
        let session = self.refresh(&tokens.refresh_token).await?;
        let user = session.user.clone();
        *self.session.write().await = Some(session.clone());
        self.events.emit(&AuthEvent::TokenRefreshed(user));
        Ok(session)
    }
}

impl std::fmt::Debug for CheckoutClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
