//! Clinician console operations.
//!
//! Everything here takes a `ClinicianGrant`. Optional features are
//! switched by `ConsoleCapabilities` rather than separate consoles.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::access::ClinicianGrant;
use crate::config::ConsoleCapabilities;
use crate::db;
use crate::error::AuthorizationError;
use crate::escalation::{EscalationCoordinator, EscalationError, QueueEntry, QueueView, TicketQueue};
use crate::messages::MessageStream;
use crate::models::enums::MessageRole;
use crate::models::{EscalationTicket, Message};
use crate::services::AssessmentClient;
use crate::store::{Store, StoreError, Topic};
use crate::subscription::Subscription;

pub const VIDEO_ROOM_PREFIX: &str = "https://meet.jit.si/remedi-secure-";

/// Shown when the summary service fails.
pub const SUMMARY_UNAVAILABLE_TEXT: &str = "Could not generate summary.";

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Escalation(#[from] EscalationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoRoom {
    pub ticket_id: Uuid,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub ticket_id: Uuid,
    pub text: String,
    /// `false` when `text` is the fallback notice.
    pub generated: bool,
}

#[derive(Clone)]
pub struct ClinicianConsole {
    store: Arc<Store>,
    queue: TicketQueue,
    stream: MessageStream,
    assessment: Arc<dyn AssessmentClient>,
    escalation: Arc<EscalationCoordinator>,
    capabilities: ConsoleCapabilities,
}

impl ClinicianConsole {
    pub fn new(
        store: Arc<Store>,
        assessment: Arc<dyn AssessmentClient>,
        escalation: Arc<EscalationCoordinator>,
        capabilities: ConsoleCapabilities,
    ) -> Self {
        Self {
            queue: TicketQueue::new(store.clone()),
            stream: MessageStream::new(store.clone()),
            store,
            assessment,
            escalation,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> ConsoleCapabilities {
        self.capabilities
    }

    pub fn queue(
        &self,
        grant: &ClinicianGrant,
        view: QueueView,
    ) -> Result<Vec<QueueEntry>, ConsoleError> {
        Ok(self.queue.list(grant, view)?)
    }

    pub fn subscribe_queue(
        &self,
        grant: &ClinicianGrant,
        view: QueueView,
    ) -> Subscription<QueueEntry> {
        self.queue.subscribe(grant, view)
    }

    /// Messages of the session behind a ticket.
    pub fn session_messages(
        &self,
        grant: &ClinicianGrant,
        ticket_id: &Uuid,
    ) -> Result<Vec<Message>, ConsoleError> {
        let ticket = self.queue.get(grant, ticket_id)?;
        Ok(self.stream.snapshot(&ticket.session_id)?)
    }

    pub fn subscribe_session(
        &self,
        grant: &ClinicianGrant,
        ticket_id: &Uuid,
    ) -> Result<Subscription<Message>, ConsoleError> {
        let ticket = self.queue.get(grant, ticket_id)?;
        tracing::debug!(
            clinician = grant.email(),
            ticket_id = %ticket_id,
            session_id = %ticket.session_id,
            "Clinician watching session"
        );
        Ok(self.stream.subscribe(&ticket.session_id))
    }

    /// Deterministic video room for a ticket's session.
    pub fn video_room(
        &self,
        grant: &ClinicianGrant,
        ticket_id: &Uuid,
    ) -> Result<VideoRoom, ConsoleError> {
        self.require(self.capabilities.video_call, "video_call")?;
        let ticket = self.queue.get(grant, ticket_id)?;
        Ok(VideoRoom {
            ticket_id: ticket.id,
            url: video_room_url(&ticket.session_id),
        })
    }

    /// Ask the summary service to condense the session.
    /// Service failures degrade to a fixed notice.
    pub async fn summarize(
        &self,
        grant: &ClinicianGrant,
        ticket_id: &Uuid,
    ) -> Result<SessionSummary, ConsoleError> {
        self.require(self.capabilities.ai_summary, "ai_summary")?;
        let ticket = self.queue.get(grant, ticket_id)?;
        let messages = self.stream.snapshot(&ticket.session_id)?;
        let history = history_text(&ticket, &messages);

        match self.assessment.summarize(&history).await {
            Ok(text) => Ok(SessionSummary {
                ticket_id: ticket.id,
                text,
                generated: true,
            }),
            Err(err) => {
                tracing::warn!(ticket_id = %ticket_id, error = %err, "Summary unavailable");
                Ok(SessionSummary {
                    ticket_id: ticket.id,
                    text: SUMMARY_UNAVAILABLE_TEXT.to_string(),
                    generated: false,
                })
            }
        }
    }

    /// Take a ticket off the queue without resolving it. A retried
    /// specialist request with the same request id still finds it.
    pub fn dismiss(&self, grant: &ClinicianGrant, ticket_id: &Uuid) -> Result<(), ConsoleError> {
        self.require(self.capabilities.ticket_dismissal, "ticket_dismissal")?;
        let dismissed = self.store.write(&[Topic::Tickets], |conn| {
            db::dismiss_ticket(conn, ticket_id, grant.email(), Utc::now().timestamp_micros())
        })?;
        let Some(ticket) = dismissed else {
            return Err(StoreError::NotFound {
                entity: "Ticket".into(),
                id: ticket_id.to_string(),
            }
            .into());
        };
        self.escalation.ticket_dismissed(&ticket)?;
        tracing::info!(ticket_id = %ticket_id, clinician = grant.email(), "Ticket dismissed");
        Ok(())
    }

    fn require(&self, enabled: bool, feature: &'static str) -> Result<(), AuthorizationError> {
        if enabled {
            Ok(())
        } else {
            Err(AuthorizationError::FeatureDisabled { feature })
        }
    }
}

pub fn video_room_url(session_id: &Uuid) -> String {
    format!("{VIDEO_ROOM_PREFIX}{session_id}")
}

/// Plain transcript handed to the summary service. Falls back to the
/// ticket preview when the session has been deleted.
fn history_text(ticket: &EscalationTicket, messages: &[Message]) -> String {
    if messages.is_empty() {
        return format!("Patient: {}", ticket.preview);
    }
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                MessageRole::Patient => "Patient",
                MessageRole::Assistant => "Remedi",
                MessageRole::Clinician => "Clinician",
            };
            format!("{speaker}: {}", m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
