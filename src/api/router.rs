//! HTTP router.
//!
//! JSON routes are nested under `/api/`, live pushes under `/ws/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Trace → 2. CORS → 3. Identity

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::api::websocket;

/// Build the full router from a pre-constructed `ApiContext`.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn build_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/sessions",
            get(endpoints::sessions::list).post(endpoints::sessions::create),
        )
        .route("/sessions/:id", delete(endpoints::sessions::remove))
        .route("/sessions/:id/messages", get(endpoints::sessions::messages))
        .route(
            "/sessions/:id/report",
            get(endpoints::sessions::download_report),
        )
        .route(
            "/sessions/:id/specialist",
            post(endpoints::escalation::request_specialist),
        )
        .route(
            "/sessions/:id/emergency/dispatch",
            post(endpoints::escalation::dispatch),
        )
        .route(
            "/sessions/:id/escalation",
            get(endpoints::escalation::state),
        )
        .route("/chat/send", post(endpoints::chat::send))
        .route(
            "/profile/emergency",
            get(endpoints::profile::get).put(endpoints::profile::put),
        )
        .route("/clinician/tickets", get(endpoints::clinician::tickets))
        .route(
            "/clinician/tickets/:id",
            delete(endpoints::clinician::dismiss),
        )
        .route(
            "/clinician/tickets/:id/messages",
            get(endpoints::clinician::messages),
        )
        .route(
            "/clinician/tickets/:id/resolve",
            post(endpoints::clinician::resolve),
        )
        .route(
            "/clinician/tickets/:id/summary",
            post(endpoints::clinician::summary),
        )
        .route(
            "/clinician/tickets/:id/video",
            get(endpoints::clinician::video),
        );

    let ws_routes = Router::new()
        .route("/ws/sessions", get(websocket::sessions))
        .route(
            "/ws/sessions/:id/messages",
            get(websocket::session_messages),
        )
        .route("/ws/clinician/tickets", get(websocket::clinician_tickets))
        .route(
            "/ws/clinician/tickets/:id/messages",
            get(websocket::clinician_session),
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api)
        .merge(ws_routes)
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::identity::resolve_identity))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
