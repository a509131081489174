//! Shared components for the read-only SQL gateway.
//!
//! Both services (the public `gateway` and the internal `query-service`
//! bastion) are assembled from the pieces in this crate:
//! - configuration and error types
//! - the SQL safety classifier
//! - the secret resolver and its store backends
//! - SigV4 request signing and verification
//! - the auth forwarder, the gateway router and its axum adapter

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod query;
pub mod response;
pub mod router;
pub mod secrets;
pub mod server;
pub mod signing;
pub mod utils;

pub use errors::{AppError, AppResult};
