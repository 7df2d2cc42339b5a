use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Basic email sanity check: one `@`, non-empty local part, dotted domain.
fn validate_email_format(email: &str) -> Result<()> {
    let email = email.trim();
    let invalid = || AppError::BadRequest("Invalid email format".into());

    let (local_part, domain_part) = email.split_once('@').ok_or_else(invalid)?;
    if local_part.is_empty() || local_part.contains(' ') || domain_part.contains('@') {
        return Err(invalid());
    }
    if !domain_part.contains('.') || domain_part.starts_with('.') || domain_part.ends_with('.') {
        return Err(invalid());
    }
    Ok(())
}

/// Storefront user. Identity is owned by the auth layer; this row is what
/// transactions and subscriptions are attributed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl CreateUser {
    pub fn validate(&self) -> Result<()> {
        validate_email_format(&self.email)?;
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Name cannot be empty".into()));
        }
        Ok(())
    }
}
