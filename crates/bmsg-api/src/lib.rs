//! bmsg-api: HTTP gateway for the bmsg server
//!
//! Operator endpoints (broadcast, send, client listing, receipts) behind
//! the admin secret, and client endpoints (register, poll, ack) keyed by
//! machine id. Built with axum.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, app, start_server};
