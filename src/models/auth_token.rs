use serde::Serialize;

/// Stored bearer token pair. Only hashes of the secrets are persisted.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub id: String,
    pub user_id: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
    pub revoked_at: Option<i64>,
    pub created_at: i64,
}

/// Freshly issued tokens. The plaintext values are only available here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}
