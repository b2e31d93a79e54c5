//! Patient send path.
//!
//! One call covers the whole round trip: lazily create the session,
//! refresh its preview, append the patient message, ask the assessment
//! service, inspect the reply for the emergency marker and append the
//! assistant message. A transport failure becomes a visible system
//! message in the stream instead of an error.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::escalation::{EscalationCoordinator, EscalationError};
use crate::messages::MessageStream;
use crate::models::enums::MessageRole;
use crate::models::{Identity, Message};
use crate::services::AssessmentClient;
use crate::sessions::{preview_from, SessionError, SessionManager};
use crate::store::StoreError;

pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Appended in place of an assessment reply when the service is down.
pub const ASSESSMENT_UNAVAILABLE_TEXT: &str =
    "System Error: the assessment service is unreachable. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Escalation(#[from] EscalationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatExchange {
    pub session_id: Uuid,
    pub session_created: bool,
    pub patient_message: Message,
    pub reply: Message,
    /// The reply carried the emergency marker; dispatch awaits confirmation.
    pub emergency: bool,
}

#[derive(Clone)]
pub struct ChatService {
    sessions: SessionManager,
    stream: MessageStream,
    assessment: Arc<dyn AssessmentClient>,
    escalation: Arc<EscalationCoordinator>,
}

impl ChatService {
    pub fn new(
        sessions: SessionManager,
        stream: MessageStream,
        assessment: Arc<dyn AssessmentClient>,
        escalation: Arc<EscalationCoordinator>,
    ) -> Self {
        Self {
            sessions,
            stream,
            assessment,
            escalation,
        }
    }

    pub async fn send(
        &self,
        patient: &Identity,
        session_id: Option<Uuid>,
        text: &str,
    ) -> Result<ChatExchange, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ValidationError::MessageTooLong {
                max: MAX_MESSAGE_CHARS,
            }
            .into());
        }

        let (session_id, session_created) = match session_id {
            Some(id) => (self.sessions.get_owned(&patient.id, &id)?.id, false),
            None => (self.sessions.create_session(&patient.id)?.id, true),
        };

        self.sessions
            .set_preview(&patient.id, &session_id, &preview_from(text))?;
        let patient_message = self
            .stream
            .append_message(&session_id, MessageRole::Patient, text)?;
        self.escalation.note_symptoms(&session_id)?;

        let (reply_text, emergency) = match self.assessment.chat(text).await {
            Ok(reply) => {
                let inspected = self.escalation.inspect_reply(&session_id, &reply)?;
                (inspected.text, inspected.emergency)
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    service = err.service(),
                    error = %err,
                    "Assessment call failed; appending system message"
                );
                (ASSESSMENT_UNAVAILABLE_TEXT.to_string(), false)
            }
        };
        let reply = self
            .stream
            .append_message(&session_id, MessageRole::Assistant, &reply_text)?;

        Ok(ChatExchange {
            session_id,
            session_created,
            patient_message,
            reply,
            emergency,
        })
    }
}
