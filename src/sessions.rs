//! Patient session lifecycle and the active-session cursor.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db;
use crate::error::{AuthorizationError, ValidationError};
use crate::messages::MessageStream;
use crate::models::{Message, Session};
use crate::store::{Store, StoreError, Topic};
use crate::subscription::Subscription;

/// Characters of the latest patient message kept as the session preview.
pub const PREVIEW_CHARS: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Explicit confirmation for irreversible deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteConfirmation {
    Confirmed,
    NotConfirmed,
}

impl From<bool> for DeleteConfirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Self::Confirmed
        } else {
            Self::NotConfirmed
        }
    }
}

/// Session preview: first 30 characters, with `...` when truncated.
pub fn preview_from(text: &str) -> String {
    let text = text.trim();
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<Store>,
}

impl SessionManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create_session(&self, owner_id: &str) -> Result<Session, SessionError> {
        let session = Session {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
            preview: String::new(),
        };
        self.store.write(
            &[Topic::Sessions {
                owner: owner_id.to_string(),
            }],
            |conn| db::insert_session(conn, &session),
        )?;
        tracing::info!(session_id = %session.id, owner_id, "Session created");
        Ok(session)
    }

    /// Load a session, checking the caller owns it.
    pub fn get_owned(&self, owner_id: &str, session_id: &Uuid) -> Result<Session, SessionError> {
        let session = self
            .store
            .read(|conn| db::get_session(conn, session_id))?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Session".into(),
                id: session_id.to_string(),
            })?;
        if session.owner_id != owner_id {
            tracing::warn!(session_id = %session_id, owner_id, "Session access by non-owner refused");
            return Err(AuthorizationError::NotOwner {
                session_id: session_id.to_string(),
            }
            .into());
        }
        Ok(session)
    }

    /// Sessions of one patient, newest first.
    pub fn list_sessions(&self, owner_id: &str) -> Result<Vec<Session>, SessionError> {
        Ok(self
            .store
            .read(|conn| db::list_sessions_by_owner(conn, owner_id))?)
    }

    /// Live list of one patient's sessions, newest first.
    pub fn open_sessions(&self, owner_id: &str) -> Subscription<Session> {
        let owner = owner_id.to_string();
        Subscription::open(
            self.store.clone(),
            Topic::Sessions {
                owner: owner.clone(),
            },
            move |store| store.read(|conn| db::list_sessions_by_owner(conn, &owner)),
        )
    }

    /// Replace only the preview text.
    pub fn set_preview(
        &self,
        owner_id: &str,
        session_id: &Uuid,
        text: &str,
    ) -> Result<(), SessionError> {
        self.get_owned(owner_id, session_id)?;
        self.store.write(
            &[Topic::Sessions {
                owner: owner_id.to_string(),
            }],
            |conn| db::update_session_preview(conn, session_id, text),
        )?;
        Ok(())
    }

    /// Irreversibly delete a session and its messages.
    pub fn delete_session(
        &self,
        owner_id: &str,
        session_id: &Uuid,
        confirmation: DeleteConfirmation,
    ) -> Result<db::SessionDeletion, SessionError> {
        if confirmation != DeleteConfirmation::Confirmed {
            return Err(ValidationError::DeletionNotConfirmed.into());
        }
        self.get_owned(owner_id, session_id)?;
        let deleted = self.store.write(
            &[
                Topic::Sessions {
                    owner: owner_id.to_string(),
                },
                Topic::Messages {
                    session: *session_id,
                },
            ],
            |conn| db::delete_session(conn, session_id),
        )?;
        tracing::info!(
            session_id = %session_id,
            messages = deleted.messages,
            "Session deleted"
        );
        Ok(deleted)
    }
}

/// The session a patient client is currently looking at.
///
/// Switching releases the previous message subscription before the next
/// one opens, so no snapshot from the old session arrives after a switch.
pub struct ActiveSession {
    stream: MessageStream,
    current: Option<(Uuid, Subscription<Message>)>,
}

impl ActiveSession {
    pub fn new(stream: MessageStream) -> Self {
        Self {
            stream,
            current: None,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    pub async fn switch_to(&mut self, session_id: Uuid) -> &mut Subscription<Message> {
        self.clear().await;
        let sub = self.stream.subscribe(&session_id);
        tracing::debug!(session_id = %session_id, "Active session switched");
        &mut self.current.insert((session_id, sub)).1
    }

    /// Release the current subscription, if any.
    pub async fn clear(&mut self) {
        if let Some((_, sub)) = self.current.take() {
            sub.release().await;
        }
    }

    pub fn subscription(&mut self) -> Option<&mut Subscription<Message>> {
        self.current.as_mut().map(|(_, sub)| sub)
    }
}
