//! Process-local cache for the admin user listing, backed by moka.
//!
//! Entries expire after a fixed TTL and the cache is bounded by entry count.
//! Creating a user invalidates every cached page.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;

use crate::models::User;
use crate::pagination::Paginated;

/// (limit, offset)
type PageKey = (i64, i64);

#[derive(Clone)]
pub struct UserCache {
    inner: MokaCache<PageKey, Arc<Paginated<User>>>,
}

impl UserCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }

    pub async fn get(&self, limit: i64, offset: i64) -> Option<Arc<Paginated<User>>> {
        self.inner.get(&(limit, offset)).await
    }

    pub async fn insert(&self, limit: i64, offset: i64, page: Arc<Paginated<User>>) {
        self.inner.insert((limit, offset), page).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for UserCache {
    fn default() -> Self {
        Self::new(256, Duration::from_secs(60))
    }
}
