pub mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::cache::UserCache;
use crate::payments::{PayPalClient, TapClient};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Public URL of this service (Tap posts webhooks here)
    pub base_url: String,
    /// Storefront URL; providers redirect buyers back to it
    pub site_url: String,
    /// None when PayPal credentials are not configured
    pub paypal: Option<PayPalClient>,
    /// None when Tap credentials are not configured
    pub tap: Option<TapClient>,
    pub user_cache: UserCache,
}

/// Open a pooled connection to a database file.
///
/// WAL mode plus a busy timeout lets concurrent captures of the same order
/// serialize on the write lock instead of failing with SQLITE_BUSY.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_secs(5))
    });
    Pool::builder().max_size(10).build(manager)
}
