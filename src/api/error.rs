//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::chat::ChatError;
use crate::console::ConsoleError;
use crate::error::{AuthorizationError, ConcurrencyConflict, TransportError, ValidationError};
use crate::escalation::EscalationError;
use crate::report::ReportError;
use crate::sessions::SessionError;
use crate::store::StoreError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    /// Client-side follow-up, e.g. `complete_profile`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Access denied: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Validation(ValidationError),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Upstream(TransportError),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut action = None;
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::Forbidden(detail) => {
                (StatusCode::FORBIDDEN, "ACCESS_DENIED", detail.clone())
            }
            ApiError::Validation(err) => {
                if err.requires_profile() {
                    action = Some("complete_profile");
                }
                (StatusCode::UNPROCESSABLE_ENTITY, err.code(), err.to_string())
            }
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Upstream(err) => {
                tracing::warn!(service = err.service(), error = %err, "Upstream failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_UNAVAILABLE",
                    format!("The {} service is unavailable", err.service()),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                action,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::Anonymous => ApiError::Unauthorized,
            other => ApiError::Forbidden(other.to_string()),
        }
    }
}

impl From<ConcurrencyConflict> for ApiError {
    fn from(err: ConcurrencyConflict) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Upstream(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Unavailable | StoreError::Database(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation(e) => e.into(),
            SessionError::Authorization(e) => e.into(),
            SessionError::Store(e) => e.into(),
        }
    }
}

impl From<EscalationError> for ApiError {
    fn from(err: EscalationError) -> Self {
        match err {
            EscalationError::Validation(e) => e.into(),
            EscalationError::Authorization(e) => e.into(),
            EscalationError::Conflict(e) => e.into(),
            EscalationError::Store(e) => e.into(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(e) => e.into(),
            ChatError::Session(e) => e.into(),
            ChatError::Escalation(e) => e.into(),
            ChatError::Store(e) => e.into(),
        }
    }
}

impl From<ConsoleError> for ApiError {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::Authorization(e) => e.into(),
            ConsoleError::Store(e) => e.into(),
            ConsoleError::Escalation(e) => e.into(),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn anonymous_returns_401() {
        let response = ApiError::from(AuthorizationError::Anonymous).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn non_clinician_returns_403() {
        let err = AuthorizationError::NotClinician {
            email: "patient@example.com".into(),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "ACCESS_DENIED");
    }

    #[tokio::test]
    async fn foreign_session_is_forbidden() {
        let err = SessionError::from(AuthorizationError::NotOwner {
            session_id: "abc".into(),
        });
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn validation_returns_422_with_specific_code() {
        let response = ApiError::from(ValidationError::EmptySession).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "EMPTY_SESSION");
        assert!(json["error"].get("action").is_none());
    }

    #[tokio::test]
    async fn missing_hospital_email_points_to_profile_form() {
        let err = EscalationError::from(ValidationError::MissingHospitalEmail);
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "PROFILE_INCOMPLETE");
        assert_eq!(json["error"]["action"], "complete_profile");
    }

    #[tokio::test]
    async fn conflict_returns_409() {
        let err = ConcurrencyConflict::DispatchInFlight {
            session_id: "s1".into(),
        };
        let response = ApiError::from(EscalationError::from(err)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn transport_returns_502() {
        let err = TransportError::Timeout {
            service: "summary",
            secs: 30,
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "UPSTREAM_UNAVAILABLE");
    }

    #[tokio::test]
    async fn store_not_found_returns_404() {
        let err = StoreError::NotFound {
            entity: "Ticket".into(),
            id: "t1".into(),
        };
        let response = ApiError::from(ConsoleError::from(err)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn store_failure_hides_details() {
        let response = ApiError::from(StoreError::Database("disk I/O error".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn bad_request_returns_400() {
        let response = ApiError::BadRequest("Invalid ID format".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
