//! HTTP API handlers
//!
//! Thin translation between JSON payloads and [`bmsg_core::Gateway`] calls.

use axum::{Extension, Json, extract::State, http::StatusCode};
use bmsg_core::{Client, DeliveryRecord, DeliveryState, Message, MessageId, Operator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Broadcast request payload
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    /// CTA target
    pub url: String,
    /// Display body
    #[serde(default, alias = "msg")]
    pub text: String,
}

/// Targeted send payload
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub client_id: String,
    pub url: String,
    #[serde(default, alias = "msg")]
    pub text: String,
}

/// Returned for a created message
#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub message_id: MessageId,
}

/// Client registration payload
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_id: String,
    /// Shown to operators as the client's label
    pub hostname: Option<String>,
    pub platform: Option<String>,
}

/// `GET /api/poll` query
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub client_id: String,
}

/// A message as handed to a polling client
#[derive(Debug, Serialize, Deserialize)]
pub struct PolledMessage {
    pub id: MessageId,
    pub url: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for PolledMessage {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            url: message.url,
            text: message.text,
            created_at: message.created_at,
        }
    }
}

/// Read acknowledgement payload
#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub client_id: String,
    pub message_id: MessageId,
}

/// `GET /api/messages` query
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// Delivery record with its derived state
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub client_id: String,
    pub state: DeliveryState,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<DeliveryRecord> for ReceiptResponse {
    fn from(record: DeliveryRecord) -> Self {
        Self {
            state: record.state(),
            client_id: record.client_id,
            delivered_at: record.delivered_at,
            read_at: record.read_at,
        }
    }
}

/// Generic API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Broadcast to every client
pub async fn broadcast(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    ApiJson(req): ApiJson<BroadcastRequest>,
) -> Result<(StatusCode, Json<DispatchResponse>)> {
    let message = state.gateway.broadcast(&operator, &req.url, &req.text)?;
    Ok((
        StatusCode::CREATED,
        Json(DispatchResponse {
            message_id: message.id,
        }),
    ))
}

/// Send to one registered client
pub async fn send(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    ApiJson(req): ApiJson<SendRequest>,
) -> Result<(StatusCode, Json<DispatchResponse>)> {
    let message = state
        .gateway
        .send(&operator, &req.client_id, &req.url, &req.text)?;
    Ok((
        StatusCode::CREATED,
        Json(DispatchResponse {
            message_id: message.id,
        }),
    ))
}

/// Client listing with last-seen time and unread count
pub async fn list_clients(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
) -> Result<Json<Vec<bmsg_core::ClientSummary>>> {
    Ok(Json(state.gateway.clients(&operator)?))
}

/// Single client entry
pub async fn get_client(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    ApiPath(client_id): ApiPath<String>,
) -> Result<Json<bmsg_core::ClientSummary>> {
    Ok(Json(state.gateway.client(&operator, &client_id)?))
}

/// Recent messages, newest first
pub async fn recent_messages(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    ApiQuery(query): ApiQuery<RecentQuery>,
) -> Result<Json<Vec<Message>>> {
    if query.limit == Some(0) {
        return Err(ApiError::InvalidRequest("limit must be positive".to_string()));
    }
    Ok(Json(state.gateway.recent_messages(&operator, query.limit)?))
}

/// Delivery receipts of one message
pub async fn receipts(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    ApiPath(message_id): ApiPath<MessageId>,
) -> Result<Json<Vec<ReceiptResponse>>> {
    let records = state.gateway.receipts(&operator, message_id)?;
    Ok(Json(records.into_iter().map(ReceiptResponse::from).collect()))
}

/// Client registration
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<Client>> {
    let client = state.gateway.register(
        &req.client_id,
        req.hostname.as_deref(),
        req.platform.as_deref(),
    )?;
    Ok(Json(client))
}

/// Pending messages for a client; marks them delivered
pub async fn poll(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PollQuery>,
) -> Result<Json<Vec<PolledMessage>>> {
    let messages = state.gateway.poll(&query.client_id)?;
    debug!("Poll {} -> {} message(s)", query.client_id, messages.len());
    Ok(Json(messages.into_iter().map(PolledMessage::from).collect()))
}

/// Read acknowledgement
pub async fn ack(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AckRequest>,
) -> Result<StatusCode> {
    state.gateway.ack(&req.client_id, req.message_id)?;
    Ok(StatusCode::NO_CONTENT)
}
