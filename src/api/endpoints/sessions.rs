//! Patient session endpoints: list, create, delete, read, report.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, Caller};
use crate::error::ValidationError;
use crate::models::{Message, Session};
use crate::report::{self, CompileResult, ReportHeader};
use crate::sessions::DeleteConfirmation;

pub const REPORT_FILENAME: &str = "Remedi_Health_Report.pdf";

#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<Session>,
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub session_id: Uuid,
    pub messages: Vec<Message>,
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub confirm: Option<bool>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub session_id: Uuid,
    pub messages_deleted: usize,
}

#[derive(Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
}

/// `GET /api/sessions` — the caller's sessions, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let sessions = ctx.sessions.list_sessions(&patient.id)?;
    Ok(Json(SessionListResponse { sessions }))
}

/// `POST /api/sessions` — start an empty session.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let session = ctx.sessions.create_session(&patient.id)?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `DELETE /api/sessions/:id?confirm=true` — irreversible, cascades messages.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let session_id = parse_id(&id)?;
    let confirmation = DeleteConfirmation::from(query.confirm.unwrap_or(false));
    let deleted = ctx
        .sessions
        .delete_session(&patient.id, &session_id, confirmation)?;
    ctx.escalation.forget(&session_id);
    Ok(Json(DeleteResponse {
        session_id,
        messages_deleted: deleted.messages,
    }))
}

/// `GET /api/sessions/:id/messages` — frozen snapshot, oldest first.
pub async fn messages(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let session_id = parse_id(&id)?;
    ctx.sessions.get_owned(&patient.id, &session_id)?;
    let messages = ctx.stream.snapshot(&session_id)?;
    Ok(Json(MessagesResponse {
        session_id,
        messages,
    }))
}

/// `GET /api/sessions/:id/report?format=pdf|text`
pub async fn download_report(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let session_id = parse_id(&id)?;
    let as_text = match query.format.as_deref() {
        None | Some("pdf") => false,
        Some("text") => true,
        Some(other) => return Err(ApiError::BadRequest(format!("Unknown report format: {other}"))),
    };

    ctx.sessions.get_owned(&patient.id, &session_id)?;
    let messages = ctx.stream.snapshot(&session_id)?;
    let document = match report::compile_with_marker(&messages, ctx.escalation.marker()) {
        CompileResult::Rendered(document) => document,
        CompileResult::Empty => return Err(ValidationError::NothingToReport.into()),
    };

    tracing::info!(
        session_id = %session_id,
        pages = document.pages.len(),
        as_text,
        "Report compiled"
    );

    if as_text {
        return Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            document.to_text(),
        )
            .into_response());
    }

    let report_header = ReportHeader {
        patient_reference: patient.email.clone(),
        generated_at: Utc::now(),
    };
    let bytes = report::render_pdf(&document, &report_header)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{REPORT_FILENAME}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
