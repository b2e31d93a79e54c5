//! Per-session append-only message log.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::MessageRole;
use crate::models::Message;
use crate::store::{Store, StoreError, Topic};
use crate::subscription::Subscription;

#[derive(Clone)]
pub struct MessageStream {
    store: Arc<Store>,
}

impl MessageStream {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Append a message. The store stamps `created_at`.
    pub fn append_message(
        &self,
        session_id: &Uuid,
        role: MessageRole,
        text: &str,
    ) -> Result<Message, StoreError> {
        let message = self.store.write(
            &[Topic::Messages {
                session: *session_id,
            }],
            |conn| {
                if db::get_session(conn, session_id)?.is_none() {
                    return Err(DatabaseError::not_found("Session", session_id));
                }
                db::insert_message(conn, session_id, Uuid::new_v4(), role, text)
            },
        )?;
        tracing::debug!(
            session_id = %session_id,
            message_id = %message.id,
            role = %role,
            "Message appended"
        );
        Ok(message)
    }

    /// Frozen copy of the stream, ascending by `created_at`.
    pub fn snapshot(&self, session_id: &Uuid) -> Result<Vec<Message>, StoreError> {
        self.store
            .read(|conn| db::get_messages_by_session(conn, session_id))
    }

    /// Live view of the stream. Each item is the full ordered list.
    pub fn subscribe(&self, session_id: &Uuid) -> Subscription<Message> {
        let session_id = *session_id;
        Subscription::open(
            self.store.clone(),
            Topic::Messages {
                session: session_id,
            },
            move |store| store.read(|conn| db::get_messages_by_session(conn, &session_id)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionManager;

    fn setup() -> (Arc<Store>, MessageStream, Uuid) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session = SessionManager::new(store.clone())
            .create_session("patient-1")
            .unwrap();
        (store.clone(), MessageStream::new(store), session.id)
    }

    #[tokio::test]
    async fn subscription_sees_strictly_increasing_timestamps() {
        let (_store, stream, sid) = setup();
        let mut sub = stream.subscribe(&sid);
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        for i in 0..5 {
            stream
                .append_message(&sid, MessageRole::Patient, &format!("symptom {i}"))
                .unwrap();
        }

        let mut latest = Vec::new();
        while latest.len() < 5 {
            latest = sub.next().await.unwrap().unwrap();
        }
        for pair in latest.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn independent_subscribers_get_same_stream() {
        let (_store, stream, sid) = setup();
        let mut a = stream.subscribe(&sid);
        let mut b = stream.subscribe(&sid);
        a.next().await.unwrap().unwrap();
        b.next().await.unwrap().unwrap();

        stream
            .append_message(&sid, MessageRole::Assistant, "How long has it hurt?")
            .unwrap();
        assert_eq!(a.next().await.unwrap().unwrap().len(), 1);
        assert_eq!(b.next().await.unwrap().unwrap().len(), 1);
    }

    #[test]
    fn append_to_missing_session_is_not_found() {
        let (_store, stream, _) = setup();
        let err = stream
            .append_message(&Uuid::new_v4(), MessageRole::Patient, "hi there")
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unreachable_store_is_distinct_from_empty() {
        let (store, stream, sid) = setup();
        assert!(stream.snapshot(&sid).unwrap().is_empty());

        store.close();
        assert_eq!(stream.snapshot(&sid).unwrap_err(), StoreError::Unavailable);
        let mut sub = stream.subscribe(&sid);
        assert_eq!(sub.next().await.unwrap(), Err(StoreError::Unavailable));
    }
}
