use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{
    CreatePayment, PaymentError, PaymentGateway, PaymentProvider, ProviderCapture, ProviderOrder,
    normalize_status, read_json, transport_error,
};

type HmacSha256 = Hmac<Sha256>;

const PROVIDER: &str = "tap";

#[derive(Debug, Clone)]
pub struct TapConfig {
    pub secret_key: String,
    pub api_base: String,
    pub currency: String,
}

/// Subset of a Tap charge object. Charges arrive both from the API and as webhook bodies.
#[derive(Debug, Clone, Deserialize)]
pub struct TapCharge {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Option<TapMetadata>,
    #[serde(default)]
    pub reference: Option<TapReference>,
    #[serde(default)]
    pub transaction: Option<TapTransaction>,
    #[serde(default)]
    pub customer: Option<TapCustomer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TapMetadata {
    pub plan_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TapReference {
    pub gateway: Option<String>,
    pub payment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TapTransaction {
    pub url: Option<String>,
    /// Milliseconds since epoch, sent as a string
    pub created: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TapCustomer {
    pub id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl TapCharge {
    pub fn parse(raw: &serde_json::Value) -> Result<Self, PaymentError> {
        serde_json::from_value(raw.clone()).map_err(|e| PaymentError::ProviderResponseInvalid {
            provider: PROVIDER,
            reason: e.to_string(),
            body: raw.to_string(),
        })
    }

    pub fn into_capture(self, raw: serde_json::Value) -> ProviderCapture {
        let metadata = self.metadata.unwrap_or_default();
        let payer = self.customer.map(|c| super::PayerInfo {
            payer_id: c.id,
            email: c.email,
            name: {
                let name = [c.first_name, c.last_name]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                (!name.is_empty()).then_some(name)
            },
        });

        ProviderCapture {
            status: normalize_status(&self.status),
            capture_id: Some(self.id),
            payer,
            plan_id: metadata.plan_id,
            user_id: metadata.user_id,
            raw,
        }
    }
}

/// Decimal places Tap uses when rendering an amount in the webhook hash.
fn currency_decimals(currency: &str) -> usize {
    match currency.to_ascii_uppercase().as_str() {
        "KWD" | "BHD" | "OMR" | "JOD" => 3,
        _ => 2,
    }
}

/// Tap Charges API client.
#[derive(Debug, Clone)]
pub struct TapClient {
    client: Client,
    config: TapConfig,
}

impl TapClient {
    pub fn new(config: &TapConfig) -> Self {
        Self {
            client: Client::new(),
            config: config.clone(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Retrieve a charge, returning the raw provider payload alongside the parsed charge.
    pub async fn retrieve_charge(
        &self,
        charge_id: &str,
    ) -> Result<(TapCharge, serde_json::Value), PaymentError> {
        let response = self
            .client
            .get(self.url(&format!("/v2/charges/{}", charge_id)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let raw: serde_json::Value = read_json(PROVIDER, response).await?;
        let charge = TapCharge::parse(&raw)?;
        Ok((charge, raw))
    }

    /// Verify the `hashstring` header Tap sends with charge webhooks.
    ///
    /// The hash is HMAC-SHA256, keyed with the secret API key, over a fixed
    /// concatenation of charge fields.
    pub fn verify_webhook_signature(&self, charge: &TapCharge, signature: &str) -> bool {
        let expected = compute_webhook_hash(&self.config.secret_key, charge);
        let expected_bytes = expected.as_bytes();
        let provided = signature.trim().to_ascii_lowercase();
        let provided_bytes = provided.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return false;
        }
        expected_bytes.ct_eq(provided_bytes).into()
    }
}

/// The string Tap signs for a charge webhook.
pub fn webhook_hash_input(charge: &TapCharge) -> String {
    let currency = charge.currency.as_deref().unwrap_or_default();
    let amount = charge
        .amount
        .map(|a| format!("{:.*}", currency_decimals(currency), a))
        .unwrap_or_default();
    let reference = charge.reference.clone().unwrap_or_default();
    let created = charge
        .transaction
        .as_ref()
        .and_then(|t| t.created.clone())
        .unwrap_or_default();

    format!(
        "x_id{}x_amount{}x_currency{}x_gateway_reference{}x_payment_reference{}x_status{}x_created{}",
        charge.id,
        amount,
        currency,
        reference.gateway.unwrap_or_default(),
        reference.payment.unwrap_or_default(),
        charge.status,
        created,
    )
}

/// Hex-encoded HMAC-SHA256 of [`webhook_hash_input`].
pub fn compute_webhook_hash(secret_key: &str, charge: &TapCharge) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret_key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(webhook_hash_input(charge).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
struct CreateChargeResponse {
    id: String,
    status: String,
    transaction: Option<TapTransaction>,
}

impl PaymentGateway for TapClient {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Tap
    }

    async fn create_payment(&self, request: &CreatePayment) -> Result<ProviderOrder, PaymentError> {
        let decimals = currency_decimals(&request.currency) as i32;
        // Tap takes a decimal amount; cents are stored with two decimals regardless of currency
        let amount = (request.amount_cents as f64 / 100.0 * 10f64.powi(decimals)).round()
            / 10f64.powi(decimals);

        let mut body = json!({
            "amount": amount,
            "currency": request.currency,
            "threeDSecure": true,
            "save_card": false,
            "description": format!("JojoPrompts plan {}", request.plan_id),
            "metadata": {
                "plan_id": request.plan_id,
                "user_id": request.user_id,
            },
            "reference": {
                "order": format!("{}:{}", request.plan_id, request.user_id),
            },
            "customer": {
                "first_name": request.customer_name.clone().unwrap_or_else(|| "Customer".to_string()),
                "email": request.customer_email,
            },
            "source": { "id": "src_all" },
            "redirect": { "url": request.return_url },
        });
        if let Some(webhook_url) = &request.webhook_url {
            body["post"] = json!({ "url": webhook_url });
        }

        let response = self
            .client
            .post(self.url("/v2/charges"))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let charge: CreateChargeResponse = read_json(PROVIDER, response).await?;
        Ok(ProviderOrder {
            order_id: charge.id,
            approve_url: charge.transaction.and_then(|t| t.url),
            status: charge.status,
        })
    }

    /// Tap captures during the hosted 3DS flow, so "capture" is a retrieve.
    async fn capture_payment(&self, order_id: &str) -> Result<ProviderCapture, PaymentError> {
        let (charge, raw) = self.retrieve_charge(order_id).await?;
        Ok(charge.into_capture(raw))
    }
}
