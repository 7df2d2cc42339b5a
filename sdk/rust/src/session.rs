//! Session backup and restoration across provider redirects.
//!
//! Leaving the site for PayPal or Tap can lose the in-memory session. Before
//! redirecting, the token pair is written to persistent storage; on return the
//! [`SessionRestorer`] tries, in order: the live session, the backup, and finally
//! attribution through the recovered transaction's owner.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutErrorCode, Result};
use crate::storage::{StorageAdapter, keys};
use crate::types::{AuthSession, SessionTokens, SessionUser};

/// Backups older than this are treated as invalid.
pub const MAX_BACKUP_AGE_SECS: i64 = 24 * 60 * 60;

pub const DEFAULT_MAX_RESTORE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBackup {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub saved_at: i64,
}

impl SessionBackup {
    /// Write the session's tokens to `storage`. Call before redirecting to a provider.
    pub fn save(storage: &dyn StorageAdapter, session: &AuthSession) {
        let backup = SessionBackup {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            saved_at: chrono::Utc::now().timestamp(),
        };
        match serde_json::to_string(&backup) {
            Ok(json) => storage.set(keys::SESSION_BACKUP, &json),
            Err(e) => tracing::warn!("Failed to serialize session backup: {}", e),
        }
    }

    /// Read the backup. Unparseable, empty or stale backups are deleted.
    pub fn load(storage: &dyn StorageAdapter) -> Option<Self> {
        let raw = storage.get(keys::SESSION_BACKUP)?;

        let backup: SessionBackup = match serde_json::from_str(&raw) {
            Ok(backup) => backup,
            Err(e) => {
                tracing::debug!("Session backup unreadable: {}", e);
                Self::clear(storage);
                return None;
            }
        };

        let age = chrono::Utc::now().timestamp() - backup.saved_at;
        if backup.access_token.is_empty() || backup.refresh_token.is_empty() || age > MAX_BACKUP_AGE_SECS {
            tracing::debug!(age, "Session backup invalid or stale");
            Self::clear(storage);
            return None;
        }

        Some(backup)
    }

    pub fn clear(storage: &dyn StorageAdapter) {
        storage.remove(keys::SESSION_BACKUP);
    }

    pub fn tokens(&self) -> SessionTokens {
        SessionTokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Operations the restorer needs from the auth backend.
pub trait AuthBackend: Send + Sync {
    /// The user of the live session, if it is still valid.
    fn current_session(&self) -> impl Future<Output = Result<Option<SessionUser>>> + Send;

    /// Access token of the live session, if any.
    fn bearer_token(&self) -> impl Future<Output = Option<String>> + Send;

    /// Re-establish a session from saved tokens.
    fn restore_session(
        &self,
        tokens: &SessionTokens,
    ) -> impl Future<Output = Result<AuthSession>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// A user was already resolved
    NotNeeded,
    /// The attempt budget is spent
    Exhausted,
    Restored(SessionUser),
    /// No session, but the transaction owner is known. Enough to attribute
    /// the payment, not enough to act as the user.
    Attributed { user_id: String },
    Failed,
}

impl RestoreOutcome {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::Restored(user) => Some(user),
            _ => None,
        }
    }

    /// User id the payment can be attributed to, authenticated or not.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Restored(user) => Some(&user.id),
            Self::Attributed { user_id } => Some(user_id),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct SessionRestorer {
    max_attempts: u32,
    attempts: u32,
}

impl Default for SessionRestorer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESTORE_ATTEMPTS)
    }
}

impl SessionRestorer {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn restore<B: AuthBackend>(
        &mut self,
        backend: &B,
        storage: &dyn StorageAdapter,
        current_user: Option<&SessionUser>,
        transaction_owner: Option<&str>,
    ) -> RestoreOutcome {
        if current_user.is_some() {
            return RestoreOutcome::NotNeeded;
        }
        if self.attempts >= self.max_attempts {
            SessionBackup::clear(storage);
            return RestoreOutcome::Exhausted;
        }
        self.attempts += 1;
        tracing::debug!(attempt = self.attempts, max = self.max_attempts, "Restoring session");

        match backend.current_session().await {
            Ok(Some(user)) => return RestoreOutcome::Restored(user),
            Ok(None) => {}
            Err(e) => tracing::debug!("Session check failed: {}", e),
        }

        if let Some(backup) = SessionBackup::load(storage) {
            match backend.restore_session(&backup.tokens()).await {
                Ok(session) => {
                    SessionBackup::clear(storage);
                    return RestoreOutcome::Restored(session.user);
                }
                Err(e) if e.is_retryable() => {
                    // Keep the backup for the next attempt.
                    tracing::warn!("Session restore failed, will retry: {}", e);
                }
                Err(e) => {
                    if e.code != CheckoutErrorCode::Authentication {
                        tracing::warn!("Session restore rejected: {}", e);
                    }
                    SessionBackup::clear(storage);
                }
            }
        }

        match transaction_owner {
            Some(owner) if !owner.is_empty() => RestoreOutcome::Attributed {
                user_id: owner.to_string(),
            },
            _ => RestoreOutcome::Failed,
        }
    }
}
