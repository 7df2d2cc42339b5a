//! JojoPrompts payments backend
//!
//! This library provides the server side of the JojoPrompts checkout: payment provider
//! integration (PayPal and Tap), transaction and subscription storage, idempotent
//! settlement of captured payments, transaction recovery and the admin API.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod payments;
pub mod rate_limit;
pub mod settlement;
pub mod util;
