//! # JojoPrompts checkout SDK
//!
//! Client-side half of the JojoPrompts payment flow: everything that happens on
//! the page a buyer returns to after paying with PayPal or Tap.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jojoprompts_sdk::{
//!     CheckoutClient, MemoryStorage, Navigator, PaymentVerifier, VerifierOptions,
//! };
//!
//! struct Redirect;
//!
//! impl Navigator for Redirect {
//!     fn navigate(&self, path: &str) {
//!         println!("go to {path}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Arc::new(CheckoutClient::new("https://api.jojoprompts.com").unwrap());
//!     let mut verifier = PaymentVerifier::new(
//!         client,
//!         Arc::new(MemoryStorage::new()),
//!         Arc::new(MemoryStorage::new()),
//!         Arc::new(Redirect),
//!         VerifierOptions::default(),
//!     );
//!
//!     let report = verifier
//!         .verify_url("https://jojoprompts.com/payment/callback?token=O1&planId=basic", None)
//!         .await;
//!     println!("{:?}", report.state);
//! }
//! ```
//!
//! ## Features
//!
//! - `native-storage` (default): [`FileStorage`], a JSON file standing in for
//!   browser local storage
//!
//! ## Trust model
//!
//! The `success` flag on a callback URL is a display hint. Only the backend's
//! capture result moves an attempt to `Completed`.

pub mod client;
pub mod error;
pub mod events;
pub mod flow;
pub mod loader;
pub mod params;
pub mod router;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;

pub use client::{CheckoutApi, CheckoutClient};

pub use error::{CheckoutError, CheckoutErrorCode, Result};

pub use events::{AuthEvent, AuthEvents, Subscription};
pub use flow::{PaymentVerifier, VerificationReport, VerifierOptions};
pub use loader::OnceLoader;
pub use params::{CallbackParams, CallbackSnapshot};
pub use router::{Destination, Navigator, RouteIds, StatusRouter};
pub use session::{AuthBackend, RestoreOutcome, SessionBackup, SessionRestorer};
pub use state::{CompletionLatch, PaymentAttempt, PaymentState};

#[cfg(feature = "native-storage")]
pub use storage::FileStorage;
pub use storage::{MemoryStorage, StorageAdapter};

pub use types::{
    AuthSession, CaptureResult, CreateOrderParams, OrderResult, Provider, SessionTokens,
    SessionUser, SubscriptionInfo, TransactionInfo, TransactionLookup,
};
