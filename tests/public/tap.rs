//! Tests for POST /tap/verify.

use httpmock::prelude::*;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_verify_returns_provider_payload_and_settles() {
    let tap = MockServer::start_async().await;
    let state = create_test_app_state_with(None, Some(&tap.base_url()));
    let user = {
        let conn = state.db.get().unwrap();
        let plan = create_test_plan(&conn, "lifetime", 4999, None);
        let user = create_test_user(&conn, "buyer@example.com", false);
        create_test_transaction(&conn, &user.id, &plan, PaymentProvider::Tap, "chg_TS02");
        user
    };
    let charge = mocks::tap_charge_body("chg_TS02", "CAPTURED", "lifetime", &user.id);
    let retrieve = mocks::tap_retrieve(&tap, charge.clone()).await;
    let app = test_app(state.clone());

    let (status, body) = send(&app, json_request("POST", "/tap/verify", &json!({ "chargeId": "chg_TS02" }), None)).await;

    assert_eq!(status, 200);
    assert_eq!(body, charge);
    retrieve.assert_async().await;

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_charge_id(&conn, "chg_TS02").unwrap().unwrap();
    assert!(sub.is_lifetime);
    assert_eq!(sub.end_date, None);
    let tx = queries::get_transaction_by_order(&conn, "chg_TS02").unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_verify_accepts_tap_id_alias() {
    let tap = MockServer::start_async().await;
    let state = create_test_app_state_with(None, Some(&tap.base_url()));
    let user = {
        let conn = state.db.get().unwrap();
        create_test_plan(&conn, "basic", 999, Some(30));
        create_test_user(&conn, "buyer@example.com", false)
    };
    mocks::tap_retrieve(&tap, mocks::tap_charge_body("chg_TS03", "INITIATED", "basic", &user.id)).await;
    let app = test_app(state.clone());

    let (status, body) = send(&app, json_request("POST", "/tap/verify", &json!({ "tap_id": "chg_TS03" }), None)).await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "INITIATED");

    let conn = state.db.get().unwrap();
    assert_eq!(count_subscriptions_for_charge(&conn, "chg_TS03"), 0);
}

#[tokio::test]
async fn test_verify_requires_charge_id() {
    let tap = MockServer::start_async().await;
    let app = test_app(create_test_app_state_with(None, Some(&tap.base_url())));

    let (status, _) = send(&app, json_request("POST", "/tap/verify", &json!({ "chargeId": "" }), None)).await;
    assert_eq!(status, 400);

    let (status, _) = send(&app, json_request("POST", "/tap/verify", &json!({}), None)).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_verify_unknown_charge_is_bad_gateway() {
    let tap = MockServer::start_async().await;
    tap.mock_async(|when, then| {
        when.method(GET).path("/v2/charges/chg_missing");
        then.status(404).json_body(json!({ "errors": [{ "code": "1108", "description": "Charge not found" }] }));
    })
    .await;
    let app = test_app(create_test_app_state_with(None, Some(&tap.base_url())));

    let (status, body) = send(&app, json_request("POST", "/tap/verify", &json!({ "chargeId": "chg_missing" }), None)).await;
    assert_eq!(status, 502);
    assert_eq!(body["retryable"], true);
}
