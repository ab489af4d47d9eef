//! Authentication middleware
//!
//! Operator endpoints require the shared admin secret, either as
//! `Authorization: Bearer <secret>` or in the `X-Admin-Secret` header.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::server::AppState;

/// Alternate header for clients that cannot set `Authorization`
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Admin secret middleware
///
/// On success the authenticated [`bmsg_core::Operator`] is stored in the
/// request extensions for the handler.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let secret = presented_secret(request.headers());
    let operator = state.gateway.authenticate(secret.as_deref())?;
    request.extensions_mut().insert(operator);
    Ok(next.run(request).await)
}

/// Secret presented by the caller, if any
pub fn presented_secret(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    bearer.or_else(|| {
        headers
            .get(ADMIN_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}
