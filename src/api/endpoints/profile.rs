//! Emergency profile read/write.

use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Caller};
use crate::db;
use crate::models::EmergencyProfile;
use crate::store::Topic;

/// `GET /api/profile/emergency` — empty profile when none saved yet.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<EmergencyProfile>, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let profile = ctx
        .store
        .read(|conn| db::get_emergency_profile(conn, &patient.id))?
        .unwrap_or_default();
    Ok(Json(profile))
}

/// `PUT /api/profile/emergency` — replace the profile; blank fields clear.
pub async fn put(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Json(profile): Json<EmergencyProfile>,
) -> Result<Json<EmergencyProfile>, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let saved = ctx.store.write(
        &[Topic::Profile {
            owner: patient.id.clone(),
        }],
        |conn| db::upsert_emergency_profile(conn, &patient.id, &profile),
    )?;
    tracing::info!(
        patient_id = %patient.id,
        has_hospital_email = saved.hospital_email.is_some(),
        "Emergency profile saved"
    );
    Ok(Json(saved))
}
