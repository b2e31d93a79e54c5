//! Clinician console endpoints. Every handler resolves a `ClinicianGrant`
//! first; callers outside the allow-list get 403.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, Caller};
use crate::config::ConsoleCapabilities;
use crate::console::{SessionSummary, VideoRoom};
use crate::escalation::{QueueEntry, QueueView, ResolveOutcome};
use crate::models::{EscalationTicket, Message};

#[derive(Deserialize)]
pub struct QueueQuery {
    pub view: Option<String>,
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub view: QueueView,
    pub tickets: Vec<QueueEntry>,
    pub capabilities: ConsoleCapabilities,
}

#[derive(Serialize)]
pub struct TicketMessagesResponse {
    pub ticket_id: Uuid,
    pub messages: Vec<Message>,
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub note: String,
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub ticket: EscalationTicket,
    /// `false` when the ticket had already been resolved.
    pub resolved: bool,
    pub note: Option<Message>,
}

pub(crate) fn parse_view(raw: Option<&str>) -> Result<QueueView, ApiError> {
    match raw {
        None => Ok(QueueView::default()),
        Some(raw) => raw.parse().map_err(ApiError::BadRequest),
    }
}

/// `GET /api/clinician/tickets?view=pending|all`
pub async fn tickets(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<QueueResponse>, ApiError> {
    let grant = ctx.gate.grant(caller.identity())?;
    let view = parse_view(query.view.as_deref())?;
    let tickets = ctx.console.queue(&grant, view)?;
    Ok(Json(QueueResponse {
        view,
        tickets,
        capabilities: ctx.console.capabilities(),
    }))
}

/// `GET /api/clinician/tickets/:id/messages`
pub async fn messages(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<TicketMessagesResponse>, ApiError> {
    let grant = ctx.gate.grant(caller.identity())?;
    let ticket_id = parse_id(&id)?;
    let messages = ctx.console.session_messages(&grant, &ticket_id)?;
    Ok(Json(TicketMessagesResponse {
        ticket_id,
        messages,
    }))
}

/// `POST /api/clinician/tickets/:id/resolve` — append the note and close
/// the ticket. Replays return 200 with `resolved: false`.
pub async fn resolve(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let grant = ctx.gate.grant(caller.identity())?;
    let ticket_id = parse_id(&id)?;
    let response = match ctx.escalation.resolve(&grant, &ticket_id, &req.note)? {
        ResolveOutcome::Resolved { ticket, note } => ResolveResponse {
            ticket,
            resolved: true,
            note,
        },
        ResolveOutcome::AlreadyResolved { ticket } => ResolveResponse {
            ticket,
            resolved: false,
            note: None,
        },
    };
    Ok(Json(response))
}

/// `POST /api/clinician/tickets/:id/summary`
pub async fn summary(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let grant = ctx.gate.grant(caller.identity())?;
    let ticket_id = parse_id(&id)?;
    let summary = ctx.console.summarize(&grant, &ticket_id).await?;
    Ok(Json(summary))
}

/// `GET /api/clinician/tickets/:id/video`
pub async fn video(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<VideoRoom>, ApiError> {
    let grant = ctx.gate.grant(caller.identity())?;
    let ticket_id = parse_id(&id)?;
    Ok(Json(ctx.console.video_room(&grant, &ticket_id)?))
}

/// `DELETE /api/clinician/tickets/:id`
pub async fn dismiss(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let grant = ctx.gate.grant(caller.identity())?;
    let ticket_id = parse_id(&id)?;
    ctx.console.dismiss(&grant, &ticket_id)?;
    Ok(StatusCode::NO_CONTENT)
}
