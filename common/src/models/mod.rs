//! Shared data models for both services.

pub mod auth;
pub mod connection;
pub mod query;
pub mod request;

// Re-export commonly used types
pub use auth::AuthRequest;
pub use connection::ConnectionParams;
pub use query::{ResultRow, SqlRequest, SqlResults};
pub use request::{ForwardedRequest, RequestContext};
