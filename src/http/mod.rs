//! HTTP surface: the forwarding shell and the operator stats endpoint.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, timeout + trace middleware)
//!     → request.rs (x-request-id)
//!     → selector picks a backend
//!     → request forwarded, outcome reported back
//! ```

pub mod request;
pub mod server;

pub use request::{RequestIdLayer, X_REQUEST_ID};
pub use server::HttpServer;
