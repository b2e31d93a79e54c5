//! Patient-side escalation: specialist requests and emergency dispatch.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, Caller};
use crate::escalation::{DispatchOutcome, EscalationState};
use crate::models::EscalationTicket;

#[derive(Deserialize)]
pub struct SpecialistRequestBody {
    /// Client-generated idempotency key.
    pub request_id: String,
}

#[derive(Serialize)]
pub struct SpecialistResponse {
    pub ticket: EscalationTicket,
    pub created: bool,
}

#[derive(Serialize)]
pub struct EscalationStateResponse {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub state: EscalationState,
}

/// `POST /api/sessions/:id/specialist` — queue the session for a clinician.
///
/// 201 on first use of `request_id`, 200 when replayed.
pub async fn request_specialist(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(body): Json<SpecialistRequestBody>,
) -> Result<(StatusCode, Json<SpecialistResponse>), ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let session_id = parse_id(&id)?;
    let request = ctx
        .escalation
        .request_specialist(patient, &session_id, &body.request_id)?;
    let status = if request.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(SpecialistResponse {
            ticket: request.ticket,
            created: request.created,
        }),
    ))
}

/// `POST /api/sessions/:id/emergency/dispatch` — patient confirmed the
/// emergency; notify the hospital once.
pub async fn dispatch(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let session_id = parse_id(&id)?;
    let outcome = ctx.escalation.dispatch(patient, &session_id).await?;
    Ok(Json(outcome))
}

/// `GET /api/sessions/:id/escalation`
pub async fn state(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<EscalationStateResponse>, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let session_id = parse_id(&id)?;
    ctx.sessions.get_owned(&patient.id, &session_id)?;
    let state = ctx.escalation.state(&session_id)?;
    Ok(Json(EscalationStateResponse { session_id, state }))
}
