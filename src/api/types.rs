//! Shared types for the HTTP API layer.

use std::sync::Arc;

use uuid::Uuid;

use crate::access::AccessGate;
use crate::api::error::ApiError;
use crate::chat::ChatService;
use crate::config::{AppConfig, ConsoleCapabilities};
use crate::console::ClinicianConsole;
use crate::escalation::EscalationCoordinator;
use crate::messages::MessageStream;
use crate::models::Identity;
use crate::services::{self, AssessmentClient, DispatchClient, HttpAssessmentClient, HttpDispatchClient};
use crate::sessions::SessionManager;
use crate::store::Store;

// ═══════════════════════════════════════════════════════════
// API context — shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<Store>,
    pub gate: Arc<AccessGate>,
    pub sessions: SessionManager,
    pub stream: MessageStream,
    pub chat: ChatService,
    pub escalation: Arc<EscalationCoordinator>,
    pub console: ClinicianConsole,
}

impl ApiContext {
    pub fn new(
        store: Arc<Store>,
        gate: AccessGate,
        assessment: Arc<dyn AssessmentClient>,
        dispatch: Arc<dyn DispatchClient>,
        emergency_marker: &str,
        capabilities: ConsoleCapabilities,
    ) -> Self {
        let sessions = SessionManager::new(store.clone());
        let stream = MessageStream::new(store.clone());
        let escalation = Arc::new(EscalationCoordinator::new(
            store.clone(),
            dispatch,
            emergency_marker,
        ));
        let chat = ChatService::new(
            sessions.clone(),
            stream.clone(),
            assessment.clone(),
            escalation.clone(),
        );
        let console = ClinicianConsole::new(store.clone(), assessment, escalation.clone(), capabilities);
        Self {
            store,
            gate: Arc::new(gate),
            sessions,
            stream,
            chat,
            escalation,
            console,
        }
    }

    /// Wire the HTTP service clients described by `config`.
    pub fn from_config(config: &AppConfig, store: Arc<Store>) -> Result<Self, reqwest::Error> {
        let client = services::http_client(config.http_timeout)?;
        let assessment = Arc::new(HttpAssessmentClient::new(
            &config.service_url,
            client.clone(),
            config.http_timeout,
        ));
        let dispatch = Arc::new(HttpDispatchClient::new(
            &config.dispatch_url,
            client,
            config.http_timeout,
        ));
        Ok(Self::new(
            store,
            AccessGate::new(config.clinician_allowlist.iter()),
            assessment,
            dispatch,
            &config.emergency_marker,
            config.console,
        ))
    }
}

#[cfg(test)]
impl ApiContext {
    /// In-memory store, scripted collaborators, one allow-listed clinician.
    pub(crate) fn for_tests(
        assessment: Arc<dyn AssessmentClient>,
        dispatch: Arc<dyn DispatchClient>,
    ) -> Self {
        let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
        Self::new(
            store,
            AccessGate::new(["doctor@remedi.ng"]),
            assessment,
            dispatch,
            crate::config::DEFAULT_EMERGENCY_MARKER,
            ConsoleCapabilities::all(),
        )
    }
}

// ═══════════════════════════════════════════════════════════
// Caller — injected by the identity middleware
// ═══════════════════════════════════════════════════════════

/// Identity forwarded by the authenticating proxy, if any.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

/// Parse a path id, reporting malformed values as 400.
pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid ID format: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(matches!(parse_id("not-a-uuid"), Err(ApiError::BadRequest(_))));
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn anonymous_caller_has_no_identity() {
        assert!(Caller::default().identity().is_none());
    }
}
