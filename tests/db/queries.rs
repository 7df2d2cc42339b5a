//! Query-level tests: users, tokens, transactions, subscriptions, webhook events.

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[test]
fn test_user_lookup_by_id_and_email() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "buyer@example.com", false);

    let by_id = queries::get_user_by_id(&conn, &user.id).unwrap().unwrap();
    assert_eq!(by_id.email, "buyer@example.com");

    let by_email = queries::get_user_by_email(&conn, "buyer@example.com").unwrap().unwrap();
    assert_eq!(by_email.id, user.id);

    assert!(queries::get_user_by_id(&conn, "missing").unwrap().is_none());
}

#[test]
fn test_access_token_resolves_user_until_expired() {
    let conn = setup_test_db();
    let (user, tokens) = create_test_user_with_token(&conn, "buyer@example.com", false);

    let found = queries::get_user_by_access_token(&conn, &tokens.access_token).unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id));

    // Refresh tokens are not access tokens
    assert!(queries::get_user_by_access_token(&conn, &tokens.refresh_token).unwrap().is_none());

    conn.execute("UPDATE auth_tokens SET access_expires_at = ?1", [now() - 1])
        .unwrap();
    assert!(queries::get_user_by_access_token(&conn, &tokens.access_token).unwrap().is_none());
}

#[test]
fn test_refresh_rotation_is_single_use() {
    let mut conn = setup_test_db();
    let (user, tokens) = create_test_user_with_token(&conn, "buyer@example.com", false);

    let (rotated_user, issued) = queries::rotate_refresh_token(&mut conn, &tokens.refresh_token)
        .unwrap()
        .expect("first rotation should succeed");
    assert_eq!(rotated_user.id, user.id);
    assert_ne!(issued.refresh_token, tokens.refresh_token);

    // The old pair is revoked, both halves
    assert!(queries::rotate_refresh_token(&mut conn, &tokens.refresh_token).unwrap().is_none());
    assert!(queries::get_user_by_access_token(&conn, &tokens.access_token).unwrap().is_none());
    assert!(queries::get_user_by_access_token(&conn, &issued.access_token).unwrap().is_some());
}

#[test]
fn test_purge_expired_tokens() {
    let conn = setup_test_db();
    let (_, stale) = create_test_user_with_token(&conn, "stale@example.com", false);
    let (_, fresh) = create_test_user_with_token(&conn, "fresh@example.com", false);

    let stale_user = queries::get_user_by_access_token(&conn, &stale.access_token).unwrap().unwrap();
    conn.execute(
        "UPDATE auth_tokens SET refresh_expires_at = ?1 WHERE user_id = ?2",
        rusqlite::params![now() - 10, stale_user.id],
    )
    .unwrap();

    assert_eq!(queries::purge_expired_tokens(&conn).unwrap(), 1);
    assert!(queries::get_user_by_access_token(&conn, &fresh.access_token).unwrap().is_some());
}

#[test]
fn test_plans_listing_and_lifetime_flag() {
    let conn = setup_test_db();
    create_test_plan(&conn, "monthly", 999, Some(30));
    let lifetime = create_test_plan(&conn, "lifetime", 4999, None);

    assert!(lifetime.is_lifetime);
    assert_eq!(lifetime.duration_days, None);
    assert!(lifetime.is_active);
    assert_eq!(queries::list_plans(&conn).unwrap().len(), 2);
}

#[test]
fn test_transaction_by_order_prefers_latest_row() {
    let conn = setup_test_db();
    let plan = create_test_plan(&conn, "basic", 999, Some(30));
    let first = create_test_user(&conn, "first@example.com", false);
    let second = create_test_user(&conn, "second@example.com", false);

    create_test_transaction(&conn, &first.id, &plan, PaymentProvider::PayPal, "O1");
    create_test_transaction(&conn, &second.id, &plan, PaymentProvider::PayPal, "O1");

    let latest = queries::get_transaction_by_order(&conn, "O1").unwrap().unwrap();
    assert_eq!(latest.user_id, second.id);

    let scoped = queries::get_user_transaction_by_order(&conn, &first.id, "O1").unwrap().unwrap();
    assert_eq!(scoped.user_id, first.id);
}

#[test]
fn test_terminal_transaction_status_is_sticky() {
    let conn = setup_test_db();
    let plan = create_test_plan(&conn, "basic", 999, Some(30));
    let user = create_test_user(&conn, "buyer@example.com", false);
    let tx = create_test_transaction(&conn, &user.id, &plan, PaymentProvider::PayPal, "O1");
    assert_eq!(tx.status, TransactionStatus::Pending);

    assert!(queries::record_provider_status(&conn, &tx.id, "APPROVED").unwrap());
    assert!(
        queries::finalize_transaction(&conn, &tx.id, TransactionStatus::Completed, "COMPLETED", Some("CAP-1"))
            .unwrap()
    );
    assert!(
        !queries::finalize_transaction(&conn, &tx.id, TransactionStatus::Failed, "DECLINED", None).unwrap()
    );
    assert!(!queries::record_provider_status(&conn, &tx.id, "PENDING").unwrap());

    let stored = queries::get_transaction_by_order(&conn, "O1").unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(stored.provider_status.as_deref(), Some("COMPLETED"));
    assert_eq!(stored.capture_id.as_deref(), Some("CAP-1"));
}

fn subscription(user_id: &str, charge_id: &str, end_date: Option<i64>) -> CreateSubscription {
    CreateSubscription {
        user_id: user_id.to_string(),
        plan_id: "basic".to_string(),
        provider_charge_id: charge_id.to_string(),
        start_date: now() - 100,
        end_date,
        is_lifetime: end_date.is_none(),
    }
}

#[test]
fn test_subscription_is_created_once_per_charge() {
    let conn = setup_test_db();
    create_test_plan(&conn, "basic", 999, Some(30));
    let user = create_test_user(&conn, "buyer@example.com", false);

    assert!(queries::create_subscription_once(&conn, &subscription(&user.id, "CAP-1", None)).unwrap());
    assert!(!queries::create_subscription_once(&conn, &subscription(&user.id, "CAP-1", None)).unwrap());
    assert_eq!(count_subscriptions_for_charge(&conn, "CAP-1"), 1);
}

#[test]
fn test_cancel_and_expire_subscriptions() {
    let conn = setup_test_db();
    create_test_plan(&conn, "basic", 999, Some(30));
    let user = create_test_user(&conn, "buyer@example.com", false);

    queries::create_subscription_once(&conn, &subscription(&user.id, "CAP-OLD", Some(now() - 10))).unwrap();
    queries::create_subscription_once(&conn, &subscription(&user.id, "CAP-A", Some(now() + 1000))).unwrap();
    queries::create_subscription_once(&conn, &subscription(&user.id, "CAP-B", None)).unwrap();

    assert_eq!(queries::expire_ended_subscriptions(&conn).unwrap(), 1);
    let expired = queries::get_subscription_by_charge_id(&conn, "CAP-OLD").unwrap().unwrap();
    assert_eq!(expired.status, SubscriptionStatus::Expired);

    assert_eq!(queries::cancel_other_active_subscriptions(&conn, &user.id, "CAP-B").unwrap(), 1);
    let active = queries::list_active_subscriptions_for_user(&conn, &user.id).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].provider_charge_id, "CAP-B");

    assert_eq!(queries::cancel_active_subscriptions(&conn, &user.id).unwrap(), 1);
    assert!(queries::list_active_subscriptions_for_user(&conn, &user.id).unwrap().is_empty());
}

#[test]
fn test_webhook_event_dedup_and_purge() {
    let conn = setup_test_db();

    assert!(queries::try_record_webhook_event(&conn, "tap", "chg_1:CAPTURED").unwrap());
    assert!(!queries::try_record_webhook_event(&conn, "tap", "chg_1:CAPTURED").unwrap());
    // Same id from another provider is a different event
    assert!(queries::try_record_webhook_event(&conn, "paypal", "chg_1:CAPTURED").unwrap());

    conn.execute(
        "UPDATE webhook_events SET created_at = ?1 WHERE provider = 'paypal'",
        [now() - 8 * 86400],
    )
    .unwrap();
    assert_eq!(queries::purge_old_webhook_events(&conn, 7).unwrap(), 1);
    assert!(!queries::try_record_webhook_event(&conn, "tap", "chg_1:CAPTURED").unwrap());
}
