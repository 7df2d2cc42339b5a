//! Auth state change notifications.
//!
//! Listeners register a callback and get back a [`Subscription`]. Dropping the
//! subscription (or calling [`Subscription::unsubscribe`]) removes the listener.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::types::SessionUser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(SessionUser),
    TokenRefreshed(SessionUser),
    SignedOut,
}

impl AuthEvent {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::SignedIn(user) | Self::TokenRefreshed(user) => Some(user),
            Self::SignedOut => None,
        }
    }
}

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;
type Registry = Mutex<BTreeMap<u64, Listener>>;

#[derive(Default)]
pub struct AuthEvents {
    listeners: Arc<Registry>,
    next_id: AtomicU64,
}

impl AuthEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, Arc::new(callback));
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// Notify every current listener, in subscription order.
    pub fn emit(&self, event: &AuthEvent) {
        // Snapshot so callbacks may unsubscribe without deadlocking.
        let listeners: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => return,
        };
        tracing::debug!(listeners = listeners.len(), ?event, "Emitting auth event");
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for AuthEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEvents")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle for a registered listener.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if let Ok(mut listeners) = registry.lock() {
            listeners.remove(&self.id);
        }
    }
}
