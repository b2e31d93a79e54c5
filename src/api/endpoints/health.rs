//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store_available: bool,
    pub live_subscriptions: usize,
    pub version: &'static str,
}

/// `GET /api/health` — liveness, open to anonymous callers.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let store_available = ctx.store.is_available();
    Json(HealthResponse {
        status: if store_available { "ok" } else { "degraded" },
        store_available,
        live_subscriptions: ctx.store.live_subscribers(),
        version: crate::config::APP_VERSION,
    })
}
