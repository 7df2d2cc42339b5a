//! Load an external resource once (e.g. a provider's checkout script).
//!
//! Concurrent callers share a single in-flight load, transient failures are
//! retried with backoff, and a resource that has gone bad can be discarded and
//! loaded again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::Result;

/// Backoff before each retry.
pub const RETRY_DELAYS_MS: [u64; 3] = [250, 500, 1000];

pub struct OnceLoader<T> {
    slot: Mutex<Option<Arc<T>>>,
    name: String,
}

impl<T> OnceLoader<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(None),
            name: name.into(),
        }
    }

    /// The loaded resource, if any. Does not wait for an in-flight load.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.try_lock().ok().and_then(|slot| slot.clone())
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Return the cached resource, loading it first if needed.
    pub async fn load<F, Fut>(&self, loader: F) -> Result<Arc<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.load_checked(loader, |_| true).await
    }

    /// Like [`load`](Self::load), but a cached resource failing `is_healthy` is
    /// dropped and loaded again.
    pub async fn load_checked<F, Fut, H>(&self, loader: F, is_healthy: H) -> Result<Arc<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
        H: Fn(&T) -> bool,
    {
        // Held for the whole load so concurrent callers wait for this one.
        let mut slot = self.slot.lock().await;

        if let Some(resource) = slot.as_ref() {
            if is_healthy(resource) {
                return Ok(resource.clone());
            }
            tracing::warn!(resource = %self.name, "Cached resource is stale, reloading");
            *slot = None;
        }

        let resource = Arc::new(self.load_with_retry(&loader).await?);
        *slot = Some(resource.clone());
        Ok(resource)
    }

    /// Drop the cached resource.
    pub async fn reset(&self) {
        *self.slot.lock().await = None;
    }

    async fn load_with_retry<F, Fut>(&self, loader: &F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delays = RETRY_DELAYS_MS.iter();
        loop {
            match loader().await {
                Ok(resource) => {
                    tracing::debug!(resource = %self.name, "Loaded");
                    return Ok(resource);
                }
                Err(e) if e.is_retryable() => match delays.next() {
                    Some(ms) => {
                        tracing::debug!(resource = %self.name, delay_ms = ms, "Load failed, retrying: {}", e);
                        tokio::time::sleep(Duration::from_millis(*ms)).await;
                    }
                    None => {
                        tracing::warn!(resource = %self.name, "Giving up loading: {}", e);
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T> std::fmt::Debug for OnceLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnceLoader").field("name", &self.name).finish()
    }
}
