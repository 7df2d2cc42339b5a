mod admin_auth;
mod user_auth;

pub use admin_auth::*;
pub use user_auth::*;
