mod auth_token;
mod plan;
mod subscription;
mod transaction;
mod user;

pub use auth_token::*;
pub use plan::*;
pub use subscription::*;
pub use transaction::*;
pub use user::*;
