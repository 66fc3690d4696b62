//! Per-connection room controller: at most one live subscription at a time.

use tracing::debug;

use crate::Error;

use super::{hub::{ChatHub, Snapshot, Subscription}, rooms::{self, Room}};

pub struct ChatStream {
    hub: ChatHub,
    active: Option<Subscription>,
}

impl ChatStream {
    pub fn new(hub: ChatHub) -> Self {
        Self { hub, active: None }
    }

    /// Tears down the current subscription, makes sure the room exists, then
    /// subscribes to it.
    pub async fn open_room(&mut self, room_id: &str) -> crate::Result<&'static Room> {
        let room = rooms::find(room_id)
            .ok_or_else(|| Error::validation(format!("La sala `{room_id}` no existe")))?;

        self.close_room();
        self.hub.ensure_room(room.id, room.name).await?;
        self.active = Some(self.hub.subscribe(room.id));
        Ok(room)
    }

    pub fn close_room(&mut self) {
        if let Some(subscription) = self.active.take() {
            debug!("closing {}", subscription.room_id());
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        self.active.as_ref().map(Subscription::room_id)
    }

    /// Next snapshot of the open room. Pends forever while no room is open,
    /// so it can sit in a `select!` next to the socket.
    pub async fn next_snapshot(&mut self) -> Snapshot {
        loop {
            let Some(subscription) = self.active.as_mut() else {
                return std::future::pending().await;
            };
            match subscription.next().await {
                Some(snapshot) => return snapshot,
                None => self.active = None,
            }
        }
    }

    pub fn hub(&self) -> &ChatHub {
        &self.hub
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{chat::store::NewMessage, db};

    fn message(room: &str, text: &str) -> NewMessage {
        NewMessage {
            room_id: room.to_owned(),
            user_id: "u1".to_owned(),
            user_name: "Ana".to_owned(),
            text: Some(text.to_owned()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn opening_a_room_creates_it_and_subscribes() {
        let db_pool = db::memory().await.unwrap();
        let mut stream = ChatStream::new(ChatHub::new(db_pool.clone()));

        let room = stream.open_room("recetas").await.unwrap();
        assert_eq!(room.id, "recetas");
        assert_eq!(stream.room_id(), Some("recetas"));
        assert!(stream.next_snapshot().await.messages.is_empty());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_rooms WHERE id='recetas'")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn unknown_rooms_are_rejected() {
        let mut stream = ChatStream::new(ChatHub::new(db::memory().await.unwrap()));
        assert!(matches!(stream.open_room("secreta").await, Err(Error::Validation(_))));
        assert_eq!(stream.room_id(), None);
    }

    #[tokio::test]
    async fn switching_rooms_silences_the_old_one() {
        let hub = ChatHub::new(db::memory().await.unwrap());
        let mut stream = ChatStream::new(hub.clone());

        stream.open_room("general").await.unwrap();
        stream.next_snapshot().await;
        hub.send(message("general", "antes")).await.unwrap();

        stream.open_room("dudas").await.unwrap();
        assert_eq!(hub.subscriber_count(), 1);
        hub.send(message("general", "después")).await.unwrap();

        // nothing tagged `general` can arrive once `dudas` is open
        for _ in 0..3 {
            match tokio::time::timeout(Duration::from_millis(50), stream.next_snapshot()).await {
                Ok(snapshot) => assert_eq!(snapshot.room_id, "dudas"),
                Err(_) => break,
            }
        }
    }

    #[tokio::test]
    async fn closed_stream_delivers_nothing() {
        let hub = ChatHub::new(db::memory().await.unwrap());
        let mut stream = ChatStream::new(hub.clone());
        stream.open_room("general").await.unwrap();
        stream.close_room();

        hub.send(message("general", "hola")).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), stream.next_snapshot()).await.is_err());
        assert_eq!(stream.room_id(), None);
    }
}
