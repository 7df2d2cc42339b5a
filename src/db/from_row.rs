//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, is_admin, created_at, updated_at";

pub const AUTH_TOKEN_COLS: &str =
    "id, user_id, access_expires_at, refresh_expires_at, revoked_at, created_at";

pub const PLAN_COLS: &str =
    "id, name, price_cents, currency, duration_days, is_lifetime, is_active, created_at";

pub const TRANSACTION_COLS: &str = "id, user_id, plan_id, provider, provider_order_id, capture_id, amount_cents, currency, status, provider_status, created_at, updated_at";

pub const SUBSCRIPTION_COLS: &str = "id, user_id, plan_id, provider_charge_id, status, start_date, end_date, is_lifetime, created_at, cancelled_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            is_admin: row.get::<_, i32>(3)? != 0,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for AuthToken {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AuthToken {
            id: row.get(0)?,
            user_id: row.get(1)?,
            access_expires_at: row.get(2)?,
            refresh_expires_at: row.get(3)?,
            revoked_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Plan {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Plan {
            id: row.get(0)?,
            name: row.get(1)?,
            price_cents: row.get(2)?,
            currency: row.get(3)?,
            duration_days: row.get(4)?,
            is_lifetime: row.get::<_, i32>(5)? != 0,
            is_active: row.get::<_, i32>(6)? != 0,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for Transaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan_id: row.get(2)?,
            provider: parse_enum(row, 3, "provider")?,
            provider_order_id: row.get(4)?,
            capture_id: row.get(5)?,
            amount_cents: row.get(6)?,
            currency: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            provider_status: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan_id: row.get(2)?,
            provider_charge_id: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            start_date: row.get(5)?,
            end_date: row.get(6)?,
            is_lifetime: row.get::<_, i32>(7)? != 0,
            created_at: row.get(8)?,
            cancelled_at: row.get(9)?,
        })
    }
}
