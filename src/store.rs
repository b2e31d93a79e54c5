//! Persistent store adapter.
//!
//! Wraps the SQLite connection with a change feed. Every write names the
//! topics it touched; live subscriptions listen on the feed and re-query
//! when their topic changes. The connection mutex is held only for one
//! synchronous call and never across an `.await`.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::{self, DatabaseError};

const CHANGE_FEED_CAPACITY: usize = 256;

/// Logical store path prefix a change is published under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `patients/{owner}/sessions`
    Sessions { owner: String },
    /// `patients/*/sessions/{session}/messages`
    Messages { session: Uuid },
    /// `escalation_tickets`
    Tickets,
    /// `patients/{owner}/settings/profile`
    Profile { owner: String },
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Sessions { owner } => write!(f, "patients/{owner}/sessions"),
            Topic::Messages { session } => write!(f, "patients/*/sessions/{session}/messages"),
            Topic::Tickets => f.write_str("escalation_tickets"),
            Topic::Profile { owner } => write!(f, "patients/{owner}/settings/profile"),
        }
    }
}

/// Notification published on the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Changed(Topic),
    /// The store went away; subscribers should surface `Unavailable`.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable")]
    Unavailable,
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
    #[error("Store failure: {0}")]
    Database(String),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => StoreError::NotFound {
                entity: entity_type,
                id,
            },
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Shared handle to the persistent store.
pub struct Store {
    conn: Mutex<Option<Connection>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        let (events, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            conn: Mutex::new(Some(conn)),
            events,
        }
    }

    /// Open (and migrate) the on-disk database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(db::open_database(path)?))
    }

    /// Fresh in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(db::open_memory_database()?))
    }

    /// Receive every change published after this call.
    pub fn changes(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Run a read-only query against the connection.
    pub fn read<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(StoreError::Unavailable)?;
        Ok(query(conn)?)
    }

    /// Run a write and publish `topics` once it has succeeded.
    pub fn write<T, F>(&self, topics: &[Topic], op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DatabaseError>,
    {
        let value = {
            let mut guard = self.lock()?;
            let conn = guard.as_mut().ok_or(StoreError::Unavailable)?;
            op(conn)?
        };
        for topic in topics {
            tracing::trace!(%topic, "Store change published");
            // No receivers is not an error.
            let _ = self.events.send(StoreEvent::Changed(topic.clone()));
        }
        Ok(value)
    }

    /// Drop the connection. Every later call returns `Unavailable` and live
    /// subscriptions are told the store went away.
    pub fn close(&self) {
        match self.conn.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
        tracing::warn!("Store closed");
        let _ = self.events.send(StoreEvent::Closed);
    }

    /// Number of change-feed listeners currently attached.
    pub fn live_subscribers(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn is_available(&self) -> bool {
        self.conn.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, StoreError> {
        self.conn.lock().map_err(|_| {
            tracing::error!("Store connection lock poisoned");
            StoreError::Unavailable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_after_close_is_unavailable() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.is_available());
        store.close();
        assert!(!store.is_available());
        let err = store.read(db::count_tables).unwrap_err();
        assert_eq!(err, StoreError::Unavailable);
    }

    #[tokio::test]
    async fn write_publishes_topics() {
        let store = Store::open_in_memory().unwrap();
        let mut changes = store.changes();
        store.write(&[Topic::Tickets], |_| Ok(())).unwrap();
        assert_eq!(changes.recv().await.unwrap(), StoreEvent::Changed(Topic::Tickets));
    }

    #[tokio::test]
    async fn failed_write_publishes_nothing() {
        let store = Store::open_in_memory().unwrap();
        let mut changes = store.changes();
        let result: Result<(), _> = store.write(&[Topic::Tickets], |_| {
            Err(DatabaseError::not_found("Session", "missing"))
        });
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn topics_render_as_store_paths() {
        let topic = Topic::Sessions {
            owner: "patient-1".into(),
        };
        assert_eq!(topic.to_string(), "patients/patient-1/sessions");
        assert_eq!(Topic::Tickets.to_string(), "escalation_tickets");
    }
}
