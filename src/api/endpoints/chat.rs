//! Chat endpoint: patient message in, assessment reply out.

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Caller};
use crate::chat::ChatExchange;

#[derive(Deserialize)]
pub struct SendRequest {
    /// Omit to start a new session with this message.
    pub session_id: Option<Uuid>,
    pub message: String,
}

/// `POST /api/chat/send`
///
/// Assessment outages do not fail the request: the reply is a system
/// message saying the service is unreachable.
pub async fn send(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<SendRequest>,
) -> Result<Json<ChatExchange>, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let exchange = ctx.chat.send(patient, req.session_id, &req.message).await?;
    Ok(Json(exchange))
}
