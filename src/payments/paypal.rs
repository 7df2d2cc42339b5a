use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use super::{
    CreatePayment, PayerInfo, PaymentError, PaymentGateway, PaymentProvider, ProviderCapture,
    ProviderOrder, format_cents, normalize_status, read_json, transport_error,
};

const PROVIDER: &str = "paypal";

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PayPalOrder {
    id: String,
    status: String,
    #[serde(default)]
    payer: Option<PayPalPayer>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    reference_id: Option<String>,
    custom_id: Option<String>,
    payments: Option<UnitPayments>,
}

#[derive(Debug, Deserialize)]
struct UnitPayments {
    #[serde(default)]
    captures: Vec<PayPalCapture>,
}

#[derive(Debug, Deserialize)]
struct PayPalCapture {
    id: String,
    status: String,
    custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayPalPayer {
    payer_id: Option<String>,
    email_address: Option<String>,
    name: Option<PayerName>,
}

#[derive(Debug, Deserialize)]
struct PayerName {
    given_name: Option<String>,
    surname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

/// PayPal Orders v2 client. Cheap to clone; the OAuth token cache is shared.
#[derive(Debug, Clone)]
pub struct PayPalClient {
    client: Client,
    config: PayPalConfig,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl PayPalClient {
    pub fn new(config: &PayPalConfig) -> Self {
        Self {
            client: Client::new(),
            config: config.clone(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Client-credentials access token, cached until shortly before expiry.
    async fn access_token(&self) -> Result<String, PaymentError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.token.write().await;
        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.access_token.clone());
        }

        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let token: TokenResponse = read_json(PROVIDER, response).await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);

        tracing::debug!(expires_in = token.expires_in, "Obtained PayPal access token");

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// Fetch an order's current state.
    async fn get_order(&self, order_id: &str) -> Result<(PayPalOrder, serde_json::Value), PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.url(&format!("/v2/checkout/orders/{}", order_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let raw: serde_json::Value = read_json(PROVIDER, response).await?;
        let order = parse_order(&raw)?;
        Ok((order, raw))
    }
}

fn parse_order(raw: &serde_json::Value) -> Result<PayPalOrder, PaymentError> {
    serde_json::from_value(raw.clone()).map_err(|e| PaymentError::ProviderResponseInvalid {
        provider: PROVIDER,
        reason: e.to_string(),
        body: raw.to_string(),
    })
}

fn is_already_captured(err: &PaymentError) -> bool {
    matches!(
        err,
        PaymentError::ProviderRequest { status: Some(422), body, .. }
            if body.contains("ORDER_ALREADY_CAPTURED")
    )
}

fn capture_from_order(order: PayPalOrder, raw: serde_json::Value) -> ProviderCapture {
    let unit = order.purchase_units.into_iter().next();
    let (plan_id, unit_custom_id, capture) = match unit {
        Some(unit) => {
            let capture = unit.payments.and_then(|p| p.captures.into_iter().next());
            (unit.reference_id, unit.custom_id, capture)
        }
        None => (None, None, None),
    };

    // Capture status is more precise than the order status (an order can be COMPLETED
    // while its capture is still PENDING or DECLINED)
    let status = capture
        .as_ref()
        .map(|c| c.status.as_str())
        .unwrap_or(order.status.as_str());
    let status = normalize_status(status);

    let user_id = unit_custom_id.or_else(|| capture.as_ref().and_then(|c| c.custom_id.clone()));

    let payer = order.payer.map(|p| PayerInfo {
        payer_id: p.payer_id,
        email: p.email_address,
        name: p.name.map(|n| {
            [n.given_name, n.surname]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
        }),
    });

    ProviderCapture {
        status,
        capture_id: capture.map(|c| c.id),
        payer,
        plan_id,
        user_id,
        raw,
    }
}

impl PaymentGateway for PayPalClient {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::PayPal
    }

    async fn create_payment(&self, request: &CreatePayment) -> Result<ProviderOrder, PaymentError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.plan_id,
                "custom_id": request.user_id,
                "amount": {
                    "currency_code": request.currency,
                    "value": format_cents(request.amount_cents),
                },
            }],
            "application_context": {
                "return_url": request.return_url,
                "cancel_url": request.cancel_url,
                "user_action": "PAY_NOW",
                "shipping_preference": "NO_SHIPPING",
            },
        });

        let response = self
            .client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let order: PayPalOrder = read_json(PROVIDER, response).await?;
        let approve_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone());

        if approve_url.is_none() {
            tracing::warn!(order_id = %order.id, "PayPal order created without an approve link");
        }

        Ok(ProviderOrder {
            order_id: order.id,
            approve_url,
            status: order.status,
        })
    }

    async fn capture_payment(&self, order_id: &str) -> Result<ProviderCapture, PaymentError> {
        let token = self.access_token().await?;
        let result = self
            .client
            .post(self.url(&format!("/v2/checkout/orders/{}/capture", order_id)))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("capture-{}", order_id))
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e));

        let captured = match result {
            Ok(response) => read_json::<serde_json::Value>(PROVIDER, response).await,
            Err(e) => Err(e),
        };

        let raw = match captured {
            Ok(raw) => raw,
            Err(e) if is_already_captured(&e) => {
                tracing::info!(order_id, "PayPal order already captured, fetching current state");
                let (order, raw) = self.get_order(order_id).await?;
                return Ok(capture_from_order(order, raw));
            }
            Err(e) => return Err(e),
        };

        let order = parse_order(&raw)?;
        Ok(capture_from_order(order, raw))
    }
}
