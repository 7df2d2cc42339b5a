//! Tests for POST /orders.

use httpmock::prelude::*;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_create_paypal_order_records_pending_transaction() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;
    let create = mocks::paypal_create_order(&paypal, "O1").await;

    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 9.99, "planId": "basic", "userId": user.id }),
            None,
        ),
    )
    .await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["orderId"], "O1");
    assert_eq!(body["provider"], "paypal");
    assert_eq!(
        body["approveUrl"],
        "https://www.sandbox.paypal.com/checkoutnow?token=O1"
    );
    create.assert_async().await;

    let conn = state.db.get().unwrap();
    let tx = queries::get_transaction_by_order(&conn, "O1")
        .unwrap()
        .expect("pending transaction should be recorded");
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.user_id, user.id);
    assert_eq!(tx.plan_id, "basic");
    assert_eq!(tx.amount_cents, 999);
    assert_eq!(tx.provider, PaymentProvider::PayPal);
}

#[tokio::test]
async fn test_create_order_sends_callback_urls_and_attribution() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;

    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };

    let create = paypal
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v2/checkout/orders")
                .json_body_partial(
                    json!({
                        "intent": "CAPTURE",
                        "purchase_units": [{
                            "reference_id": "basic",
                            "custom_id": user.id,
                            "amount": { "currency_code": "USD", "value": "9.99" }
                        }],
                        "application_context": {
                            "return_url": format!(
                                "http://localhost:5173/payment/callback?provider=paypal&planId=basic&userId={}",
                                user.id
                            ),
                            "cancel_url": "http://localhost:5173/payment-failed?planId=basic&reason=Payment%20cancelled&status=CANCELLED"
                        }
                    })
                    .to_string(),
                );
            then.status(201).json_body(json!({ "id": "O2", "status": "CREATED", "links": [] }));
        })
        .await;

    let app = test_app(state);
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 9.99, "planId": "basic", "userId": user.id }),
            None,
        ),
    )
    .await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["orderId"], "O2");
    assert!(body["approveUrl"].is_null());
    create.assert_async().await;
}

#[tokio::test]
async fn test_create_tap_charge_returns_hosted_url() {
    let tap = MockServer::start_async().await;
    let create = tap
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v2/charges")
                .header("Authorization", format!("Bearer {}", TAP_SECRET))
                .json_body_partial(
                    json!({
                        "amount": 9.99,
                        "currency": "USD",
                        "source": { "id": "src_all" },
                        "metadata": { "plan_id": "basic" },
                        "post": { "url": "http://localhost:3000/webhooks/tap" }
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({
                "id": "chg_TS01",
                "status": "INITIATED",
                "transaction": { "url": "https://checkout.tap.company/?token=chg_TS01" }
            }));
        })
        .await;

    let state = create_test_app_state_with(None, Some(&tap.base_url()));
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "tap", "amount": 9.99, "planId": "basic", "userId": user.id }),
            None,
        ),
    )
    .await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["orderId"], "chg_TS01");
    assert_eq!(body["approveUrl"], "https://checkout.tap.company/?token=chg_TS01");
    create.assert_async().await;

    let conn = state.db.get().unwrap();
    let tx = queries::get_transaction_by_order(&conn, "chg_TS01").unwrap().unwrap();
    assert_eq!(tx.provider, PaymentProvider::Tap);
}

#[tokio::test]
async fn test_create_order_validation_errors() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state);

    let cases = [
        json!({ "provider": "stripe", "amount": 9.99, "planId": "basic", "userId": user.id }),
        json!({ "provider": "paypal", "amount": 9.99, "planId": "", "userId": user.id }),
        json!({ "provider": "paypal", "amount": 9.99, "planId": "basic", "userId": "  " }),
        json!({ "provider": "paypal", "amount": -1.0, "planId": "basic", "userId": user.id }),
        json!({ "provider": "paypal", "amount": 0.0, "planId": "basic", "userId": user.id }),
        json!({ "provider": "paypal", "planId": "basic", "userId": user.id }),
    ];

    for body in cases {
        let (status, response) = send(&app, json_request("POST", "/orders", &body, None)).await;
        assert_eq!(status, 400, "request {body} should be rejected, got {response}");
    }
}

#[tokio::test]
async fn test_create_order_rejects_amount_not_matching_plan() {
    let paypal = MockServer::start_async().await;
    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 0.01, "planId": "basic", "userId": user.id }),
            None,
        ),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["details"], "amount does not match the plan price");
}

#[tokio::test]
async fn test_create_order_unknown_plan_or_user_is_not_found() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 9.99, "planId": "gold", "userId": user.id }),
            None,
        ),
    )
    .await;
    assert_eq!(status, 404);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 9.99, "planId": "basic", "userId": "nobody" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_create_order_inactive_plan_rejected() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "legacy", 499, Some(30));
        conn.execute("UPDATE plans SET is_active = 0 WHERE id = 'legacy'", [])
            .unwrap();
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 4.99, "planId": "legacy", "userId": user.id }),
            None,
        ),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["details"], "Plan is not available for purchase");
}

#[tokio::test]
async fn test_create_order_without_provider_credentials_is_503() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 9.99, "planId": "basic", "userId": user.id }),
            None,
        ),
    )
    .await;

    assert_eq!(status, 503);
    assert_eq!(body["error"], "Payment provider unavailable");
    assert!(body.get("details").is_none(), "configuration details must not leak");
}

#[tokio::test]
async fn test_create_order_provider_failure_is_retryable_502() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;
    paypal
        .mock_async(|when, then| {
            when.method(POST).path("/v2/checkout/orders");
            then.status(500).json_body(json!({ "name": "INTERNAL_SERVICE_ERROR" }));
        })
        .await;

    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 9.99, "planId": "basic", "userId": user.id }),
            None,
        ),
    )
    .await;

    assert_eq!(status, 502);
    assert_eq!(body["retryable"], true);

    let conn = state.db.get().unwrap();
    let (_, total) = queries::list_transactions_paginated(&conn, &TransactionFilters::default(), 50, 0).unwrap();
    assert_eq!(total, 0, "no transaction should be recorded when the provider fails");
}

#[tokio::test]
async fn test_create_order_for_another_user_is_forbidden() {
    let state = create_test_app_state();
    let (caller_token, victim) = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        let (_, tokens) = create_test_user_with_token(&conn, "caller@example.com", false);
        let victim = create_test_user(&conn, "victim@example.com", false);
        (tokens.access_token, victim)
    };
    let app = test_app(state);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 9.99, "planId": "basic", "userId": victim.id }),
            Some(&caller_token),
        ),
    )
    .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_create_order_rejects_plan_in_unsupported_currency() {
    let paypal = MockServer::start_async().await;
    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        queries::create_plan(
            &conn,
            &CreatePlan {
                id: "kw-basic".into(),
                name: "Basic (KWD)".into(),
                price_cents: 300,
                currency: "KWD".into(),
                duration_days: Some(30),
                is_lifetime: false,
            },
        )
        .unwrap();
        create_test_user(&conn, "buyer@example.com", false)
    };
    let app = test_app(state);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &json!({ "provider": "paypal", "amount": 3.0, "planId": "kw-basic", "userId": user.id }),
            None,
        ),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["details"], "Plan currency is not supported by this provider");
}
