//! Tests for POST /orders/capture.

use httpmock::prelude::*;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn capture_body(provider: &str, order_id: &str) -> serde_json::Value {
    json!({ "provider": provider, "orderId": order_id })
}

#[tokio::test]
async fn test_paypal_capture_completed_creates_subscription() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;

    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "basic", 999, Some(30));
        let user = create_test_user(&conn, "buyer@example.com", false);
        create_test_transaction(&conn, &user.id, &plan, PaymentProvider::PayPal, "O1");
        user
    };
    let capture = mocks::paypal_capture(&paypal, "O1", "basic", &user.id, "COMPLETED").await;
    let app = test_app(state.clone());

    let (status, body) = send(&app, json_request("POST", "/orders/capture", &capture_body("paypal", "O1"), None)).await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(
        body,
        json!({
            "success": true,
            "captureId": "CAP-O1",
            "status": "COMPLETED",
            "planId": "basic",
            "userId": user.id
        })
    );
    capture.assert_async().await;

    let conn = state.db.get().unwrap();
    let tx = queries::get_transaction_by_order(&conn, "O1").unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.capture_id.as_deref(), Some("CAP-O1"));

    let sub = queries::get_subscription_by_charge_id(&conn, "CAP-O1")
        .unwrap()
        .expect("subscription should exist");
    assert_eq!(sub.user_id, user.id);
    assert_eq!(sub.plan_id, "basic");
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.end_date, Some(sub.start_date + 30 * 86400));
}

#[tokio::test]
async fn test_paypal_capture_declined_returns_402_without_subscription() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;

    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "basic", 999, Some(30));
        let user = create_test_user(&conn, "buyer@example.com", false);
        create_test_transaction(&conn, &user.id, &plan, PaymentProvider::PayPal, "O2");
        user
    };
    mocks::paypal_capture(&paypal, "O2", "basic", &user.id, "DECLINED").await;
    let app = test_app(state.clone());

    let (status, body) = send(&app, json_request("POST", "/orders/capture", &capture_body("paypal", "O2"), None)).await;

    assert_eq!(status, 402);
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "DECLINED");
    assert_eq!(body["captureId"], "CAP-O2");
    assert_eq!(body["planId"], "basic");
    assert_eq!(body["userId"], user.id.as_str());

    let conn = state.db.get().unwrap();
    let tx = queries::get_transaction_by_order(&conn, "O2").unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(count_subscriptions_for_charge(&conn, "CAP-O2"), 0);
}

#[tokio::test]
async fn test_paypal_capture_pending_keeps_transaction_pending() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;

    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "basic", 999, Some(30));
        let user = create_test_user(&conn, "buyer@example.com", false);
        create_test_transaction(&conn, &user.id, &plan, PaymentProvider::PayPal, "O3");
        user
    };
    mocks::paypal_capture(&paypal, "O3", "basic", &user.id, "PENDING").await;
    let app = test_app(state.clone());

    let (status, body) = send(&app, json_request("POST", "/orders/capture", &capture_body("paypal", "O3"), None)).await;

    assert_eq!(status, 402);
    assert_eq!(body["status"], "PENDING");

    let conn = state.db.get().unwrap();
    let tx = queries::get_transaction_by_order(&conn, "O3").unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.provider_status.as_deref(), Some("PENDING"));
}

#[tokio::test]
async fn test_already_captured_order_falls_back_to_order_lookup() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;

    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "basic", 999, Some(30));
        let user = create_test_user(&conn, "buyer@example.com", false);
        create_test_transaction(&conn, &user.id, &plan, PaymentProvider::PayPal, "O4");
        user
    };

    paypal
        .mock_async(|when, then| {
            when.method(POST).path("/v2/checkout/orders/O4/capture");
            then.status(422).json_body(json!({
                "name": "UNPROCESSABLE_ENTITY",
                "details": [{ "issue": "ORDER_ALREADY_CAPTURED" }]
            }));
        })
        .await;
    let order_body = mocks::paypal_order_body("O4", "basic", &user.id, "COMPLETED");
    let lookup = paypal
        .mock_async(|when, then| {
            when.method(GET).path("/v2/checkout/orders/O4");
            then.status(200).json_body(order_body);
        })
        .await;

    let app = test_app(state.clone());
    let (status, body) = send(&app, json_request("POST", "/orders/capture", &capture_body("paypal", "O4"), None)).await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["captureId"], "CAP-O4");
    lookup.assert_async().await;

    let conn = state.db.get().unwrap();
    assert_eq!(count_subscriptions_for_charge(&conn, "CAP-O4"), 1);
}

#[tokio::test]
async fn test_repeated_capture_converges_on_one_subscription() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;

    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let user = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "basic", 999, Some(30));
        let user = create_test_user(&conn, "buyer@example.com", false);
        create_test_transaction(&conn, &user.id, &plan, PaymentProvider::PayPal, "O5");
        user
    };
    mocks::paypal_capture(&paypal, "O5", "basic", &user.id, "COMPLETED").await;
    let app = test_app(state.clone());

    for _ in 0..3 {
        let (status, body) =
            send(&app, json_request("POST", "/orders/capture", &capture_body("paypal", "O5"), None)).await;
        assert_eq!(status, 200);
        assert_eq!(body["userId"], user.id.as_str());
    }

    let conn = state.db.get().unwrap();
    assert_eq!(count_subscriptions_for_charge(&conn, "CAP-O5"), 1);
}

#[tokio::test]
async fn test_tap_capture_retrieves_charge() {
    let tap = MockServer::start_async().await;

    let state = create_test_app_state_with(None, Some(&tap.base_url()));
    let user = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "basic", 999, Some(30));
        let user = create_test_user(&conn, "buyer@example.com", false);
        create_test_transaction(&conn, &user.id, &plan, PaymentProvider::Tap, "chg_TS01");
        user
    };
    mocks::tap_retrieve(&tap, mocks::tap_charge_body("chg_TS01", "CAPTURED", "basic", &user.id)).await;
    let app = test_app(state.clone());

    let (status, body) = send(&app, json_request("POST", "/orders/capture", &capture_body("tap", "chg_TS01"), None)).await;

    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["captureId"], "chg_TS01");
    assert_eq!(body["status"], "COMPLETED");

    let conn = state.db.get().unwrap();
    assert_eq!(count_subscriptions_for_charge(&conn, "chg_TS01"), 1);
}

#[tokio::test]
async fn test_capture_requires_order_id_and_known_provider() {
    let app = test_app(create_test_app_state());

    let (status, _) = send(&app, json_request("POST", "/orders/capture", &capture_body("paypal", " "), None)).await;
    assert_eq!(status, 400);

    let (status, _) = send(&app, json_request("POST", "/orders/capture", &capture_body("venmo", "O1"), None)).await;
    assert_eq!(status, 400);

    let (status, _) = send(&app, json_request("POST", "/orders/capture", &capture_body("paypal", "O1"), None)).await;
    assert_eq!(status, 503);
}

#[tokio::test]
async fn test_capture_of_another_users_order_is_forbidden() {
    let paypal = MockServer::start_async().await;
    let state = create_test_app_state_with(Some(&paypal.base_url()), None);
    let intruder_token = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "basic", 999, Some(30));
        let owner = create_test_user(&conn, "owner@example.com", false);
        create_test_transaction(&conn, &owner.id, &plan, PaymentProvider::PayPal, "O6");
        let (_, tokens) = create_test_user_with_token(&conn, "intruder@example.com", false);
        tokens.access_token
    };
    let app = test_app(state);

    let (status, _) = send(
        &app,
        json_request("POST", "/orders/capture", &capture_body("paypal", "O6"), Some(&intruder_token)),
    )
    .await;
    assert_eq!(status, 403);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_captures_create_exactly_one_subscription() {
    let paypal = MockServer::start_async().await;
    mocks::paypal_token(&paypal).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("capture.db");
    let pool = create_pool(db_path.to_str().unwrap()).unwrap();
    init_db(&pool.get().unwrap()).unwrap();
    let state = app_state(pool, Some(&paypal.base_url()), None);

    let user = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "basic", 999, Some(30));
        let user = create_test_user(&conn, "buyer@example.com", false);
        create_test_transaction(&conn, &user.id, &plan, PaymentProvider::PayPal, "O7");
        user
    };
    mocks::paypal_capture(&paypal, "O7", "basic", &user.id, "COMPLETED").await;
    let app = test_app(state.clone());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                send(&app, json_request("POST", "/orders/capture", &capture_body("paypal", "O7"), None)).await
            })
        })
        .collect();

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, 200, "body: {body}");
        assert_eq!(body["captureId"], "CAP-O7");
        assert_eq!(body["planId"], "basic");
    }

    let conn = state.db.get().unwrap();
    assert_eq!(count_subscriptions_for_charge(&conn, "CAP-O7"), 1);
    let tx = queries::get_transaction_by_order(&conn, "O7").unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
}
