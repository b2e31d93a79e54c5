//! Caller identity from the authenticating reverse proxy.
//!
//! The proxy forwards `X-Remedi-User-Id` and `X-Remedi-User-Email` for
//! signed-in users. A request missing either header is anonymous; handlers
//! decide whether that is acceptable.

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::Caller;
use crate::models::Identity;

pub const USER_ID_HEADER: &str = "x-remedi-user-id";
pub const USER_EMAIL_HEADER: &str = "x-remedi-user-email";

/// Inject a `Caller` into request extensions.
pub async fn resolve_identity(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let caller = Caller(identity_from_headers(req.headers()));
    if let Some(identity) = caller.identity() {
        tracing::debug!(user_id = %identity.id, path = %req.uri().path(), "Request identity");
    }
    req.extensions_mut().insert(caller);
    next.run(req).await
}

fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let id = header(USER_ID_HEADER)?;
    let email = header(USER_EMAIL_HEADER)?;
    Some(Identity::new(id, email))
}
