//! Test utilities and fixtures for JojoPrompts integration tests

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde_json::Value;
use tower::ServiceExt;

pub use jojoprompts::cache::UserCache;
pub use jojoprompts::db::{AppState, DbPool, create_pool, init_db, queries};
pub use jojoprompts::handlers;
pub use jojoprompts::models::*;
pub use jojoprompts::payments::{
    PayPalClient, PayPalConfig, PaymentProvider, ProviderCapture, TapCharge, TapClient, TapConfig,
    compute_webhook_hash,
};
pub use jojoprompts::settlement::{Attribution, settle_capture, settle_webhook_capture};

pub const TAP_SECRET: &str = "sk_test_jojo";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn paypal_config(api_base: &str) -> PayPalConfig {
    PayPalConfig {
        client_id: "paypal-client".to_string(),
        client_secret: "paypal-secret".to_string(),
        api_base: api_base.to_string(),
        currency: "USD".to_string(),
    }
}

pub fn tap_config(api_base: &str) -> TapConfig {
    TapConfig {
        secret_key: TAP_SECRET.to_string(),
        api_base: api_base.to_string(),
        currency: "USD".to_string(),
    }
}

fn memory_pool() -> DbPool {
    // A single connection: every checkout sees the same in-memory database
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    pool
}

pub fn app_state(pool: DbPool, paypal_base: Option<&str>, tap_base: Option<&str>) -> AppState {
    AppState {
        db: pool,
        base_url: "http://localhost:3000".to_string(),
        site_url: "http://localhost:5173".to_string(),
        paypal: paypal_base.map(|base| PayPalClient::new(&paypal_config(base))),
        tap: tap_base.map(|base| TapClient::new(&tap_config(base))),
        user_cache: UserCache::default(),
    }
}

/// AppState with no payment providers configured
pub fn create_test_app_state() -> AppState {
    app_state(memory_pool(), None, None)
}

/// AppState whose providers point at mock servers
pub fn create_test_app_state_with(paypal_base: Option<&str>, tap_base: Option<&str>) -> AppState {
    app_state(memory_pool(), paypal_base, tap_base)
}

/// Public + webhook + admin routes, without rate limiting
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::public::strict_routes())
        .merge(handlers::public::standard_routes())
        .merge(handlers::public::relaxed_routes())
        .merge(handlers::webhooks::router())
        .merge(handlers::admin::router(state.clone()))
        .with_state(state)
}

pub fn create_test_user(conn: &Connection, email: &str, is_admin: bool) -> User {
    queries::create_user(
        conn,
        &CreateUser {
            email: email.to_string(),
            name: format!("Test User {}", email),
            is_admin,
        },
    )
    .expect("Failed to create test user")
}

/// Create a user and return it with a fresh access token
pub fn create_test_user_with_token(conn: &Connection, email: &str, is_admin: bool) -> (User, IssuedTokens) {
    let user = create_test_user(conn, email, is_admin);
    let tokens = queries::issue_tokens(conn, &user.id).expect("Failed to issue tokens");
    (user, tokens)
}

pub fn create_test_plan(conn: &Connection, id: &str, price_cents: i64, duration_days: Option<i32>) -> Plan {
    queries::create_plan(
        conn,
        &CreatePlan {
            id: id.to_string(),
            name: format!("Plan {}", id),
            price_cents,
            currency: "USD".to_string(),
            duration_days,
            is_lifetime: duration_days.is_none(),
        },
    )
    .expect("Failed to create test plan")
}

pub fn create_test_transaction(
    conn: &Connection,
    user_id: &str,
    plan: &Plan,
    provider: PaymentProvider,
    order_id: &str,
) -> Transaction {
    queries::create_transaction(
        conn,
        &CreateTransaction {
            user_id: user_id.to_string(),
            plan_id: plan.id.clone(),
            provider,
            provider_order_id: order_id.to_string(),
            amount_cents: plan.price_cents,
            currency: plan.currency.clone(),
        },
    )
    .expect("Failed to create test transaction")
}

pub fn capture(status: &str, capture_id: Option<&str>) -> ProviderCapture {
    ProviderCapture {
        status: status.to_string(),
        capture_id: capture_id.map(str::to_string),
        payer: None,
        plan_id: None,
        user_id: None,
        raw: serde_json::json!({}),
    }
}

pub fn count_subscriptions_for_charge(conn: &Connection, charge_id: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM subscriptions WHERE provider_charge_id = ?1",
        [charge_id],
        |row| row.get(0),
    )
    .unwrap()
}

// ============ HTTP helpers ============

pub fn json_request(method: &str, uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn send(app: &Router, request: Request<Body>) -> (u16, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status().as_u16();
    (status, body_json(response).await)
}

// ============ Provider mocks ============

pub mod mocks {
    use httpmock::prelude::*;
    use serde_json::json;

    /// OAuth token endpoint
    pub async fn paypal_token(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/oauth2/token");
                then.status(200).json_body(json!({
                    "access_token": "A21AAtest",
                    "token_type": "Bearer",
                    "expires_in": 32400
                }));
            })
            .await
    }

    pub async fn paypal_create_order<'a>(server: &'a MockServer, order_id: &str) -> httpmock::Mock<'a> {
        let order_id = order_id.to_string();
        server
            .mock_async(move |when, then| {
                when.method(POST)
                    .path("/v2/checkout/orders")
                    .header("Authorization", "Bearer A21AAtest");
                then.status(201).json_body(json!({
                    "id": order_id,
                    "status": "CREATED",
                    "links": [
                        { "href": format!("https://api-m.sandbox.paypal.com/v2/checkout/orders/{}", order_id), "rel": "self" },
                        { "href": format!("https://www.sandbox.paypal.com/checkoutnow?token={}", order_id), "rel": "approve" }
                    ]
                }));
            })
            .await
    }

    pub fn paypal_order_body(order_id: &str, plan_id: &str, user_id: &str, capture_status: &str) -> serde_json::Value {
        json!({
            "id": order_id,
            "status": "COMPLETED",
            "payer": {
                "payer_id": "PAYER1",
                "email_address": "buyer@example.com",
                "name": { "given_name": "Test", "surname": "Buyer" }
            },
            "purchase_units": [{
                "reference_id": plan_id,
                "custom_id": user_id,
                "payments": {
                    "captures": [{ "id": format!("CAP-{}", order_id), "status": capture_status }]
                }
            }]
        })
    }

    pub async fn paypal_capture<'a>(
        server: &'a MockServer,
        order_id: &str,
        plan_id: &str,
        user_id: &str,
        capture_status: &str,
    ) -> httpmock::Mock<'a> {
        let body = paypal_order_body(order_id, plan_id, user_id, capture_status);
        let path = format!("/v2/checkout/orders/{}/capture", order_id);
        server
            .mock_async(move |when, then| {
                when.method(POST).path(path);
                then.status(201).json_body(body);
            })
            .await
    }

    pub fn tap_charge_body(charge_id: &str, status: &str, plan_id: &str, user_id: &str) -> serde_json::Value {
        json!({
            "id": charge_id,
            "status": status,
            "amount": 9.99,
            "currency": "USD",
            "metadata": { "plan_id": plan_id, "user_id": user_id },
            "reference": { "gateway": "123456", "payment": "2208231234" },
            "transaction": {
                "url": format!("https://checkout.tap.company/?mode=page&token={}", charge_id),
                "created": "1692784411000"
            },
            "customer": { "first_name": "Test", "email": "buyer@example.com" }
        })
    }

    pub async fn tap_retrieve<'a>(server: &'a MockServer, body: serde_json::Value) -> httpmock::Mock<'a> {
        let path = format!("/v2/charges/{}", body["id"].as_str().unwrap_or_default());
        server
            .mock_async(move |when, then| {
                when.method(GET).path(path);
                then.status(200).json_body(body);
            })
            .await
    }
}
