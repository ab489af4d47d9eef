//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::handlers::{
    ack, broadcast, get_client, health, list_clients, poll, receipts, recent_messages, register,
    send,
};
use crate::middleware::auth::require_admin;
use crate::server::AppState;

/// Create the API router
pub fn routes(state: AppState) -> Router<AppState> {
    let operator = Router::new()
        .route("/api/broadcast", post(broadcast))
        .route("/api/send", post(send))
        .route("/api/clients", get(list_clients))
        .route("/api/clients/{client_id}", get(get_client))
        .route("/api/messages", get(recent_messages))
        .route("/api/messages/{message_id}/receipts", get(receipts))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    Router::new()
        // Health check
        .route("/health", get(health))
        // Client endpoints
        .route("/api/register", post(register))
        .route("/api/poll", get(poll))
        .route("/api/ack", post(ack))
        // Operator endpoints
        .merge(operator)
}
