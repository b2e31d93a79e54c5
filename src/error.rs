//! Failure taxonomy shared by every component.
//!
//! - `ValidationError`: a precondition failed before any state transition.
//!   Never reaches the network layer.
//! - `TransportError`: an external service was unreachable, slow, or non-2xx.
//! - `AuthorizationError`: the identity may not use the requested surface.
//!   Terminal and non-retryable.
//! - `ConcurrencyConflict`: a racing write lost a compare-and-set.

/// Missing or invalid input detected before a state transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please explain your symptoms before requesting a specialist")]
    EmptySession,
    #[error("Emergency profile has no hospital email; complete your profile before dispatching")]
    MissingHospitalEmail,
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Message too long (max {max} chars)")]
    MessageTooLong { max: usize },
    #[error("Clinician note cannot be empty")]
    EmptyNote,
    #[error("Request id must be 1-{max} characters")]
    InvalidRequestId { max: usize },
    #[error("No emergency is awaiting dispatch for this session")]
    NoEmergencyPending,
    #[error("Deleting a session requires explicit confirmation")]
    DeletionNotConfirmed,
    #[error("This session has nothing to put in a report yet")]
    NothingToReport,
}

impl ValidationError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptySession => "EMPTY_SESSION",
            Self::MissingHospitalEmail => "PROFILE_INCOMPLETE",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            Self::EmptyNote => "EMPTY_NOTE",
            Self::InvalidRequestId { .. } => "INVALID_REQUEST_ID",
            Self::NoEmergencyPending => "NO_EMERGENCY_PENDING",
            Self::DeletionNotConfirmed => "CONFIRMATION_REQUIRED",
            Self::NothingToReport => "EMPTY_REPORT",
        }
    }

    /// Whether the caller should be sent to the emergency profile form.
    pub fn requires_profile(&self) -> bool {
        matches!(self, Self::MissingHospitalEmail)
    }
}

/// An external HTTP collaborator failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{service} service did not answer within {secs}s")]
    Timeout { service: &'static str, secs: u64 },
    #[error("{service} service unreachable: {detail}")]
    Unreachable { service: &'static str, detail: String },
    #[error("{service} service returned HTTP {status}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} service sent an unreadable response: {detail}")]
    InvalidResponse { service: &'static str, detail: String },
}

impl TransportError {
    pub fn service(&self) -> &'static str {
        match self {
            Self::Timeout { service, .. }
            | Self::Unreachable { service, .. }
            | Self::Status { service, .. }
            | Self::InvalidResponse { service, .. } => service,
        }
    }
}

/// The identity may not perform the requested operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("Sign in required")]
    Anonymous,
    #[error("The account {email} is not authorized for the clinician console")]
    NotClinician { email: String },
    #[error("Session {session_id} belongs to another patient")]
    NotOwner { session_id: String },
    #[error("Clinician console feature disabled: {feature}")]
    FeatureDisabled { feature: &'static str },
}

/// A concurrent writer won a race on shared state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConcurrencyConflict {
    #[error("Ticket {ticket_id} changed concurrently (expected version {expected}, found {found})")]
    TicketVersion {
        ticket_id: String,
        expected: i64,
        found: i64,
    },
    #[error("An emergency dispatch is already in flight for session {session_id}")]
    DispatchInFlight { session_id: String },
}
