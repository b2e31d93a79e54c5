//! Live query subscriptions over the store's change feed.
//!
//! A `Subscription<T>` owns a forwarding task that pushes a fresh snapshot
//! every time its topic changes. Releasing the handle aborts the task and
//! waits for it to finish, so no snapshot is delivered afterwards.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::store::{Store, StoreError, StoreEvent, Topic};

const SNAPSHOT_BUFFER: usize = 16;

pub type Snapshot<T> = Result<Vec<T>, StoreError>;

pub struct Subscription<T> {
    topic: Topic,
    rx: mpsc::Receiver<Snapshot<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Start a live query. The first item is the current snapshot.
    pub fn open<Q>(store: Arc<Store>, topic: Topic, query: Q) -> Self
    where
        Q: Fn(&Store) -> Snapshot<T> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        // Subscribe before the first query so no change slips between them.
        let events = store.changes();
        let task = tokio::spawn(forward(store, topic.clone(), query, events, tx));
        tracing::debug!(%topic, "Subscription opened");
        Self {
            topic,
            rx,
            task: Some(task),
        }
    }
}

impl<T> Subscription<T> {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next snapshot, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Snapshot<T>> {
        self.rx.recv().await
    }

    /// Stop the forwarding task and wait until it has terminated.
    pub async fn release(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.rx.close();
        tracing::debug!(topic = %self.topic, "Subscription released");
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn forward<T, Q>(
    store: Arc<Store>,
    topic: Topic,
    query: Q,
    mut events: broadcast::Receiver<StoreEvent>,
    tx: mpsc::Sender<Snapshot<T>>,
) where
    T: Clone + PartialEq + Send + 'static,
    Q: Fn(&Store) -> Snapshot<T> + Send + Sync + 'static,
{
    let mut last: Option<Vec<T>> = None;

    let first = query(&store);
    let unavailable = matches!(first, Err(StoreError::Unavailable));
    if !push(&tx, &mut last, first).await || unavailable {
        return;
    }

    loop {
        match events.recv().await {
            Ok(StoreEvent::Changed(changed)) if changed == topic => {
                if !push(&tx, &mut last, query(&store)).await {
                    return;
                }
            }
            Ok(StoreEvent::Changed(_)) => {}
            Ok(StoreEvent::Closed) => {
                let _ = tx.send(Err(StoreError::Unavailable)).await;
                return;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(%topic, skipped, "Subscription lagged; re-querying");
                if !push(&tx, &mut last, query(&store)).await {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Deliver a snapshot unless it equals the previous one.
/// Returns `false` once the receiver is gone.
async fn push<T: Clone + PartialEq>(
    tx: &mpsc::Sender<Snapshot<T>>,
    last: &mut Option<Vec<T>>,
    snapshot: Snapshot<T>,
) -> bool {
    match snapshot {
        Ok(items) => {
            if last.as_ref() == Some(&items) {
                return true;
            }
            *last = Some(items.clone());
            tx.send(Ok(items)).await.is_ok()
        }
        Err(err) => {
            *last = None;
            tx.send(Err(err)).await.is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rusqlite::params;

    fn counter_query(store: &Store) -> Snapshot<i64> {
        store.read(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM emergency_profiles", [], |r| r.get(0))?;
            Ok(vec![n])
        })
    }

    fn touch(store: &Store, patient: &str) {
        store
            .write(&[Topic::Profile { owner: patient.into() }], |conn| {
                conn.execute(
                    "INSERT INTO emergency_profiles (patient_id, updated_at_us) VALUES (?1, 0)",
                    params![patient],
                )?;
                Ok(())
            })
            .unwrap();
    }

    fn profile_topic() -> Topic {
        Topic::Profile {
            owner: "patient-1".into(),
        }
    }

    #[tokio::test]
    async fn initial_snapshot_then_updates() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut sub = Subscription::open(store.clone(), profile_topic(), counter_query);
        assert_eq!(sub.next().await.unwrap().unwrap(), vec![0]);

        touch(&store, "patient-1");
        assert_eq!(sub.next().await.unwrap().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn other_topics_do_not_wake_subscription() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut sub = Subscription::open(store.clone(), profile_topic(), counter_query);
        sub.next().await.unwrap().unwrap();

        touch(&store, "patient-2");
        let waited = tokio::time::timeout(Duration::from_millis(100), sub.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn closed_store_yields_unavailable_not_empty() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.close();
        let mut sub = Subscription::open(store, profile_topic(), counter_query);
        assert_eq!(sub.next().await.unwrap(), Err(StoreError::Unavailable));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn store_closing_mid_subscription_is_reported() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut sub = Subscription::open(store.clone(), profile_topic(), counter_query);
        sub.next().await.unwrap().unwrap();

        store.close();
        assert_eq!(sub.next().await.unwrap(), Err(StoreError::Unavailable));
    }

    #[tokio::test]
    async fn release_waits_for_forwarding_task() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut sub = Subscription::open(store.clone(), profile_topic(), counter_query);
        sub.next().await.unwrap().unwrap();
        assert_eq!(store.live_subscribers(), 1);

        sub.release().await;
        assert_eq!(store.live_subscribers(), 0);
    }
}
