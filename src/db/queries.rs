use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::util::{generate_token, hash_token};

use super::from_row::{
    AUTH_TOKEN_COLS, PLAN_COLS, SUBSCRIPTION_COLS, TRANSACTION_COLS, USER_COLS, query_all,
    query_one,
};

const SECONDS_PER_DAY: i64 = 86400;

/// Access tokens live one hour
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;
/// Refresh tokens live 30 days
pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * SECONDS_PER_DAY;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &CreateUser) -> Result<User> {
    let id = gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();
    let name = input.name.trim().to_string();

    conn.execute(
        "INSERT INTO users (id, email, name, is_admin, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, &email, &name, input.is_admin as i32, now, now],
    )?;

    Ok(User {
        id,
        email,
        name,
        is_admin: input.is_admin,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

pub fn list_users_paginated(conn: &Connection, limit: i64, offset: i64) -> Result<(Vec<User>, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id LIMIT ?1 OFFSET ?2",
            USER_COLS
        ),
        params![limit, offset],
    )?;
    Ok((items, total))
}

// ============ Auth Tokens ============

/// Issue a new access/refresh token pair for a user.
pub fn issue_tokens(conn: &Connection, user_id: &str) -> Result<IssuedTokens> {
    let now = now();
    let access_token = format!("jpa_{}", generate_token());
    let refresh_token = format!("jpr_{}", generate_token());
    let access_expires_at = now + ACCESS_TOKEN_TTL_SECS;
    let refresh_expires_at = now + REFRESH_TOKEN_TTL_SECS;

    conn.execute(
        "INSERT INTO auth_tokens (id, user_id, access_hash, refresh_hash, access_expires_at, refresh_expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            gen_id(),
            user_id,
            hash_token(&access_token),
            hash_token(&refresh_token),
            access_expires_at,
            refresh_expires_at,
            now
        ],
    )?;

    Ok(IssuedTokens {
        access_token,
        refresh_token,
        access_expires_at,
        refresh_expires_at,
    })
}

/// Resolve the user behind an unexpired, unrevoked access token.
pub fn get_user_by_access_token(conn: &Connection, access_token: &str) -> Result<Option<User>> {
    let cols = USER_COLS
        .split(", ")
        .map(|c| format!("u.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    query_one(
        conn,
        &format!(
            "SELECT {} FROM auth_tokens t
             JOIN users u ON u.id = t.user_id
             WHERE t.access_hash = ?1 AND t.revoked_at IS NULL AND t.access_expires_at > ?2",
            cols
        ),
        params![hash_token(access_token), now()],
    )
}

/// Exchange a refresh token for a new pair. The old pair is revoked in the same
/// statement that checks it, so a refresh token can only be used once.
pub fn rotate_refresh_token(
    conn: &mut Connection,
    refresh_token: &str,
) -> Result<Option<(User, IssuedTokens)>> {
    let tx = conn.transaction()?;
    let now = now();

    let token: Option<AuthToken> = query_one(
        &tx,
        &format!(
            "UPDATE auth_tokens SET revoked_at = ?1
             WHERE refresh_hash = ?2 AND revoked_at IS NULL AND refresh_expires_at > ?1
             RETURNING {}",
            AUTH_TOKEN_COLS
        ),
        params![now, hash_token(refresh_token)],
    )?;

    let Some(token) = token else {
        return Ok(None);
    };
    let Some(user) = get_user_by_id(&tx, &token.user_id)? else {
        return Ok(None);
    };

    let issued = issue_tokens(&tx, &user.id)?;
    tx.commit()?;
    Ok(Some((user, issued)))
}

/// Delete tokens whose refresh window has passed. Returns the number of deleted rows.
pub fn purge_expired_tokens(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM auth_tokens WHERE refresh_expires_at < ?1",
        params![now()],
    )?;
    Ok(deleted)
}

// ============ Plans ============

pub fn create_plan(conn: &Connection, input: &CreatePlan) -> Result<Plan> {
    let now = now();
    let currency = input.currency.trim().to_uppercase();
    let duration_days = if input.is_lifetime {
        None
    } else {
        input.duration_days
    };

    conn.execute(
        "INSERT INTO plans (id, name, price_cents, currency, duration_days, is_lifetime, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
        params![
            &input.id,
            &input.name,
            input.price_cents,
            &currency,
            duration_days,
            input.is_lifetime as i32,
            now
        ],
    )?;

    Ok(Plan {
        id: input.id.clone(),
        name: input.name.clone(),
        price_cents: input.price_cents,
        currency,
        duration_days,
        is_lifetime: input.is_lifetime,
        is_active: true,
        created_at: now,
    })
}

pub fn get_plan_by_id(conn: &Connection, id: &str) -> Result<Option<Plan>> {
    query_one(
        conn,
        &format!("SELECT {} FROM plans WHERE id = ?1", PLAN_COLS),
        &[&id],
    )
}

pub fn list_plans(conn: &Connection) -> Result<Vec<Plan>> {
    query_all(
        conn,
        &format!("SELECT {} FROM plans ORDER BY price_cents", PLAN_COLS),
        &[],
    )
}

// ============ Transactions ============

pub fn create_transaction(conn: &Connection, input: &CreateTransaction) -> Result<Transaction> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO transactions (id, user_id, plan_id, provider, provider_order_id, amount_cents, currency, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9)",
        params![
            &id,
            &input.user_id,
            &input.plan_id,
            input.provider.as_ref(),
            &input.provider_order_id,
            input.amount_cents,
            &input.currency,
            now,
            now
        ],
    )?;

    Ok(Transaction {
        id,
        user_id: input.user_id.clone(),
        plan_id: input.plan_id.clone(),
        provider: input.provider,
        provider_order_id: input.provider_order_id.clone(),
        capture_id: None,
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        status: TransactionStatus::Pending,
        provider_status: None,
        created_at: now,
        updated_at: now,
    })
}

/// Most recent transaction for a provider order id, regardless of owner.
pub fn get_transaction_by_order(conn: &Connection, order_id: &str) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE provider_order_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            TRANSACTION_COLS
        ),
        &[&order_id],
    )
}

/// Most recent transaction for a provider order id owned by `user_id`.
pub fn get_user_transaction_by_order(
    conn: &Connection,
    user_id: &str,
    order_id: &str,
) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE provider_order_id = ?1 AND user_id = ?2
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            TRANSACTION_COLS
        ),
        &[&order_id, &user_id],
    )
}

pub fn list_transactions_paginated(
    conn: &Connection,
    filters: &TransactionFilters,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Transaction>, i64)> {
    let mut where_clause = String::from("WHERE 1=1");
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref v) = filters.user_id {
        where_clause.push_str(" AND user_id = ?");
        values.push(Box::new(v.clone()));
    }
    if let Some(ref v) = filters.plan_id {
        where_clause.push_str(" AND plan_id = ?");
        values.push(Box::new(v.clone()));
    }
    if let Some(v) = filters.provider {
        where_clause.push_str(" AND provider = ?");
        values.push(Box::new(v.as_ref().to_string()));
    }
    if let Some(v) = filters.status {
        where_clause.push_str(" AND status = ?");
        values.push(Box::new(v.as_ref().to_string()));
    }

    let count_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM transactions {}", where_clause),
        count_refs.as_slice(),
        |row| row.get(0),
    )?;

    values.push(Box::new(limit));
    values.push(Box::new(offset));
    let refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM transactions {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            TRANSACTION_COLS, where_clause
        ),
        refs.as_slice(),
    )?;

    Ok((items, total))
}

/// Move a pending transaction to a terminal status. Returns false when the row is
/// missing or already terminal (terminal statuses are sticky).
pub fn finalize_transaction(
    conn: &Connection,
    id: &str,
    status: TransactionStatus,
    provider_status: &str,
    capture_id: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions
         SET status = ?1, provider_status = ?2, capture_id = COALESCE(?3, capture_id), updated_at = ?4
         WHERE id = ?5 AND status = 'pending'",
        params![status.as_ref(), provider_status, capture_id, now(), id],
    )?;
    Ok(affected > 0)
}

/// Record the latest non-terminal provider status on a pending transaction.
pub fn record_provider_status(conn: &Connection, id: &str, provider_status: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions SET provider_status = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![provider_status, now(), id],
    )?;
    Ok(affected > 0)
}

// ============ Subscriptions ============

/// Insert a subscription unless one already exists for the provider charge id.
/// Returns true if this call created the row.
pub fn create_subscription_once(conn: &Connection, input: &CreateSubscription) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO subscriptions (id, user_id, plan_id, provider_charge_id, status, start_date, end_date, is_lifetime, created_at)
         VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?7, ?8)",
        params![
            gen_id(),
            &input.user_id,
            &input.plan_id,
            &input.provider_charge_id,
            input.start_date,
            input.end_date,
            input.is_lifetime as i32,
            now()
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_subscription_by_charge_id(
    conn: &Connection,
    provider_charge_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE provider_charge_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&provider_charge_id],
    )
}

pub fn list_active_subscriptions_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Subscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1 AND status = 'active'
             ORDER BY created_at DESC",
            SUBSCRIPTION_COLS
        ),
        &[&user_id],
    )
}

/// Cancel every active subscription of a user except `keep_charge_id`.
pub fn cancel_other_active_subscriptions(
    conn: &Connection,
    user_id: &str,
    keep_charge_id: &str,
) -> Result<usize> {
    let now = now();
    let affected = conn.execute(
        "UPDATE subscriptions SET status = 'cancelled', cancelled_at = ?1
         WHERE user_id = ?2 AND status = 'active' AND provider_charge_id != ?3",
        params![now, user_id, keep_charge_id],
    )?;
    Ok(affected)
}

/// Cancel all active subscriptions of a user. Returns how many were cancelled.
pub fn cancel_active_subscriptions(conn: &Connection, user_id: &str) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE subscriptions SET status = 'cancelled', cancelled_at = ?1
         WHERE user_id = ?2 AND status = 'active'",
        params![now(), user_id],
    )?;
    Ok(affected)
}

/// Mark active subscriptions past their end date as expired.
pub fn expire_ended_subscriptions(conn: &Connection) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE subscriptions SET status = 'expired'
         WHERE status = 'active' AND end_date IS NOT NULL AND end_date < ?1",
        params![now()],
    )?;
    Ok(affected)
}

// ============ Webhook Event Deduplication ============

/// Atomically record a webhook event, returning true if this is a new event.
pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (provider, event_id, created_at) VALUES (?1, ?2, ?3)",
        params![provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge webhook events beyond the retention period. Returns the number of deleted records.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * SECONDS_PER_DAY);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
