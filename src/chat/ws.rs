use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{session::CurrentUser, storage::{ObjectStore, Storage}, Error};

use super::{images::upload_prefix, ChatHub, ChatMessage, ChatStream, NewMessage, Snapshot};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Open { room: String },
    Send {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        image: Option<ImageRef>,
    },
    Close,
}

/// An uploaded chat image, named by its store path. Any URL the client sends
/// along is ignored; the served URL always comes from the store.
#[derive(Debug, Deserialize)]
pub struct ImageRef {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Opened { room: &'static str, name: &'static str },
    Snapshot {
        room: String,
        messages: Vec<ChatMessage>,
        failed: bool,
    },
    /// A rejected command; `draft` hands the unsent text back.
    Error { message: String, draft: Option<String> },
}

impl From<Snapshot> for ServerFrame {
    fn from(snapshot: Snapshot) -> Self {
        ServerFrame::Snapshot {
            room: snapshot.room_id,
            messages: snapshot.messages,
            failed: snapshot.failed,
        }
    }
}

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    user: CurrentUser,
    State(hub): State<ChatHub>,
    State(storage): State<Storage>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |socket| serve(socket, hub, storage, user).await)
}

enum Event {
    Incoming(Option<Result<Message, axum::Error>>),
    Snapshot(Snapshot),
}

async fn serve(socket: WebSocket, hub: ChatHub, storage: Storage, user: CurrentUser) {
    let (mut sender, mut receiver) = socket.split();
    let mut stream = ChatStream::new(hub);
    debug!("u/{} connected to chat", user.id);

    loop {
        let event = tokio::select! {
            msg = receiver.next() => Event::Incoming(msg),
            snapshot = stream.next_snapshot() => Event::Snapshot(snapshot),
        };

        let reply = match event {
            Event::Incoming(Some(Ok(Message::Text(text)))) => handle(&mut stream, &*storage, &user, text.as_str()).await,
            Event::Incoming(Some(Ok(Message::Close(_))) | None) => break,
            Event::Incoming(Some(Ok(_))) => None,
            Event::Incoming(Some(Err(err))) => {
                debug!("chat socket for u/{} failed: {err}", user.id);
                break;
            }
            Event::Snapshot(snapshot) => Some(snapshot.into()),
        };

        let Some(reply) = reply else { continue };
        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(err) => {
                warn!("unserializable chat frame: {err}");
                continue;
            }
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }

    // dropping the stream releases any open subscription
    drop(stream);
    debug!("u/{} left chat", user.id);
}

/// Applies one client command, returning the frame to answer with, if any.
pub async fn handle(
    stream: &mut ChatStream,
    store: &dyn ObjectStore,
    user: &CurrentUser,
    text: &str,
) -> Option<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(err) => return Some(ServerFrame::Error { message: format!("bad frame: {err}"), draft: None }),
    };

    match frame {
        ClientFrame::Open { room } => match stream.open_room(&room).await {
            Ok(room) => Some(ServerFrame::Opened { room: room.id, name: room.name }),
            Err(err) => Some(ServerFrame::Error { message: err.to_string(), draft: None }),
        },
        ClientFrame::Close => {
            stream.close_room();
            None
        }
        ClientFrame::Send { text, image } => {
            let draft = text.clone();
            match send(stream, store, user, text, image).await {
                Ok(message) => {
                    debug!("u/{} posted #{} to {}", user.id, message.seq, message.room_id);
                    None
                }
                Err(err) => {
                    warn!("u/{} failed to send: {err}", user.id);
                    Some(ServerFrame::Error { message: err.to_string(), draft })
                }
            }
        }
    }
}

async fn send(
    stream: &ChatStream,
    store: &dyn ObjectStore,
    user: &CurrentUser,
    text: Option<String>,
    image: Option<ImageRef>,
) -> crate::Result<ChatMessage> {
    let room_id = stream.room_id()
        .ok_or_else(|| Error::validation("Abre una sala antes de enviar mensajes"))?
        .to_owned();

    if let Some(image) = &image {
        let owned = image.path.starts_with(&upload_prefix(&room_id, &user.id))
            && !image.path.contains("..");
        if !owned {
            return Err(Error::validation("La imagen no pertenece a esta sala"));
        }
        if !store.exists(&image.path).await? {
            return Err(Error::validation("La imagen no se ha subido"));
        }
    }

    stream.hub().send(NewMessage {
        room_id,
        user_id: user.id.clone(),
        user_name: user.display_name.clone(),
        text,
        image_url: image.as_ref().map(|i| store.url(&i.path)),
        image_path: image.map(|i| i.path),
    }).await
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{chat::images::upload_chat_image, db, storage::LocalStore, users::Role};

    fn ana() -> CurrentUser {
        CurrentUser {
            id: "u1".to_owned(),
            email: "ana@example.com".to_owned(),
            display_name: "Ana".to_owned(),
            role: Role::Member,
        }
    }

    struct Fixture {
        stream: ChatStream,
        store: LocalStore,
        _files: TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            let files = tempfile::tempdir().unwrap();
            Self {
                stream: ChatStream::new(ChatHub::new(db::memory().await.unwrap())),
                store: LocalStore::new(files.path(), "/files"),
                _files: files,
            }
        }

        async fn handle(&mut self, user: &CurrentUser, text: &str) -> Option<ServerFrame> {
            handle(&mut self.stream, &self.store, user, text).await
        }
    }

    #[tokio::test]
    async fn open_then_send() {
        let mut chat = Fixture::new().await;
        let user = ana();

        let opened = chat.handle(&user, r#"{"type":"open","room":"consejos"}"#).await;
        assert!(matches!(opened, Some(ServerFrame::Opened { room: "consejos", .. })));
        assert!(chat.stream.next_snapshot().await.messages.is_empty());

        let reply = chat.handle(&user, r#"{"type":"send","text":"  sal al final  "}"#).await;
        assert!(reply.is_none());

        let snapshot = chat.stream.next_snapshot().await;
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].text.as_deref(), Some("sal al final"));
        assert_eq!(snapshot.messages[0].user_name, "Ana");
    }

    #[tokio::test]
    async fn failed_send_returns_the_draft() {
        let mut chat = Fixture::new().await;
        let user = ana();

        let reply = chat.handle(&user, r#"{"type":"send","text":"hola"}"#).await;
        match reply {
            Some(ServerFrame::Error { draft, .. }) => assert_eq!(draft.as_deref(), Some("hola")),
            other => panic!("expected error frame, got {other:?}"),
        }

        chat.handle(&user, r#"{"type":"open","room":"general"}"#).await;
        let reply = chat.handle(&user, r#"{"type":"send","text":"   "}"#).await;
        assert!(matches!(reply, Some(ServerFrame::Error { .. })));
    }

    #[tokio::test]
    async fn images_must_come_from_the_senders_uploads() {
        let mut chat = Fixture::new().await;
        let user = ana();
        chat.handle(&user, r#"{"type":"open","room":"general"}"#).await;

        let foreign = r#"{"type":"send","image":{"url":"/files/chat/general/u2/a.png","path":"chat/general/u2/a.png"}}"#;
        assert!(matches!(chat.handle(&user, foreign).await, Some(ServerFrame::Error { .. })));

        let never_uploaded = r#"{"type":"send","image":{"path":"chat/general/u1/missing.png"}}"#;
        assert!(matches!(chat.handle(&user, never_uploaded).await, Some(ServerFrame::Error { .. })));
        assert!(chat.stream.next_snapshot().await.messages.is_empty());
    }

    #[tokio::test]
    async fn image_urls_come_from_the_store() {
        let mut chat = Fixture::new().await;
        let user = ana();
        chat.handle(&user, r#"{"type":"open","room":"general"}"#).await;
        chat.stream.next_snapshot().await;

        let uploaded = upload_chat_image(&chat.store, "general", &user.id, Some("image/png"), vec![1, 2, 3])
            .await
            .unwrap();
        let frame = serde_json::json!({
            "type": "send",
            "image": { "url": "https://evil.example/x.png", "path": uploaded.path },
        });
        assert!(chat.handle(&user, &frame.to_string()).await.is_none());

        let snapshot = chat.stream.next_snapshot().await;
        assert_eq!(snapshot.messages[0].image_url.as_deref(), Some(uploaded.url.as_str()));
        assert!(uploaded.url.starts_with("/files/chat/general/u1/"));
    }

    #[tokio::test]
    async fn garbage_is_answered_not_fatal() {
        let mut chat = Fixture::new().await;
        let reply = chat.handle(&ana(), "not json").await;
        assert!(matches!(reply, Some(ServerFrame::Error { draft: None, .. })));
    }

    #[test]
    fn frames_are_tagged() {
        let json = serde_json::to_value(ServerFrame::Error { message: "x".to_owned(), draft: None }).unwrap();
        assert_eq!(json["type"], "error");
    }
}
