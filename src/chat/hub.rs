//! Live room subscriptions with snapshot delivery.
//!
//! Every append to a room is announced on a broadcast channel. Each
//! [`Subscription`] owns a task that re-reads the room log on every
//! announcement and publishes the full ordered list through a `watch`
//! channel, so a slow reader only ever sees the newest snapshot.

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::{sync::{broadcast, watch}, task::JoinHandle};
use tracing::{debug, warn};

use super::store::{self, ChatMessage, NewMessage};

/// The full ordered message set of a room at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub room_id: String,
    pub messages: Vec<ChatMessage>,
    /// The log could not be read; `messages` is empty.
    pub failed: bool,
}

#[derive(Clone)]
pub struct ChatHub {
    db_pool: SqlitePool,
    tx: broadcast::Sender<Arc<str>>,
}

impl ChatHub {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            tx: broadcast::channel(64).0,
        }
    }

    pub async fn ensure_room(&self, room_id: &str, name: &str) -> crate::Result<()> {
        store::ensure_room(&self.db_pool, room_id, name).await
    }

    /// Appends a message and wakes every subscriber of its room.
    pub async fn send(&self, message: NewMessage) -> crate::Result<ChatMessage> {
        let message = store::insert_message(&self.db_pool, message).await?;
        let notified = self.tx.send(Arc::from(message.room_id.as_str())).unwrap_or(0);
        debug!("message #{} in {} announced to {notified} subscribers", message.seq, message.room_id);
        Ok(message)
    }

    pub fn subscribe(&self, room_id: &str) -> Subscription {
        // subscribe before the first read so no append can slip between them
        let changes = self.tx.subscribe();
        let (snapshots, rx) = watch::channel(None);
        let task = tokio::spawn(forward(self.db_pool.clone(), room_id.to_owned(), changes, snapshots));
        debug!("subscribed to {room_id}");

        Subscription {
            room_id: room_id.to_owned(),
            rx,
            task,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

async fn forward(
    db_pool: SqlitePool,
    room_id: String,
    mut changes: broadcast::Receiver<Arc<str>>,
    snapshots: watch::Sender<Option<Snapshot>>,
) {
    loop {
        let snapshot = match store::room_messages(&db_pool, &room_id).await {
            Ok(messages) => Snapshot { room_id: room_id.clone(), messages, failed: false },
            Err(err) => {
                warn!("failed to load {room_id}: {err}");
                Snapshot { room_id: room_id.clone(), messages: Vec::new(), failed: true }
            }
        };
        if snapshots.send(Some(snapshot)).is_err() {
            return;
        }

        loop {
            match changes.recv().await {
                Ok(changed) if *changed == *room_id => break,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("{room_id} subscriber lagged by {skipped}, reloading");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

/// A live view of one room. Dropping it stops delivery immediately.
pub struct Subscription {
    room_id: String,
    rx: watch::Receiver<Option<Snapshot>>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Waits for the next snapshot; `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Snapshot> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(snapshot) = self.rx.borrow_and_update().clone() {
                return Some(snapshot);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        debug!("unsubscribed from {}", self.room_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db;

    fn message(room: &str, text: &str) -> NewMessage {
        NewMessage {
            room_id: room.to_owned(),
            user_id: "u1".to_owned(),
            user_name: "Ana".to_owned(),
            text: Some(text.to_owned()),
            ..Default::default()
        }
    }

    async fn hub() -> ChatHub {
        let hub = ChatHub::new(db::memory().await.unwrap());
        hub.ensure_room("general", "General").await.unwrap();
        hub.ensure_room("recetas", "Recetas").await.unwrap();
        hub
    }

    #[tokio::test]
    async fn first_delivery_is_the_current_log() {
        let hub = hub().await;
        hub.send(message("general", "hola")).await.unwrap();

        let mut sub = hub.subscribe("general");
        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.room_id, "general");
        assert_eq!(snapshot.messages.len(), 1);
        assert!(!snapshot.failed);
    }

    #[tokio::test]
    async fn every_send_ends_in_a_sorted_full_snapshot() {
        let hub = hub().await;
        let mut sub = hub.subscribe("general");
        assert!(sub.next().await.unwrap().messages.is_empty());

        for i in 0..5 {
            hub.send(message("general", &format!("m{i}"))).await.unwrap();
        }

        let mut last = Vec::new();
        while last.len() < 5 {
            last = tokio::time::timeout(Duration::from_secs(5), sub.next())
                .await
                .unwrap()
                .unwrap()
                .messages;
        }
        assert!(last.windows(2).all(|w| (w[0].created_at, w[0].seq) <= (w[1].created_at, w[1].seq)));
        assert_eq!(last.last().unwrap().text.as_deref(), Some("m4"));
    }

    #[tokio::test]
    async fn other_rooms_do_not_wake_subscribers() {
        let hub = hub().await;
        let mut sub = hub.subscribe("general");
        sub.next().await.unwrap();

        hub.send(message("recetas", "tarta")).await.unwrap();
        let woke = tokio::time::timeout(Duration::from_millis(100), sub.next()).await;
        assert!(woke.is_err());
    }

    #[tokio::test]
    async fn dropping_the_subscription_releases_it() {
        let hub = hub().await;
        let sub = hub.subscribe("general");
        assert_eq!(hub.subscriber_count(), 1);

        drop(sub);
        // the aborted task drops its receiver on the next scheduler turn
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        }).await.unwrap();
    }
}
