use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{db, Error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    /// Server write order; breaks timestamp ties.
    pub seq: i64,
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    #[serde(skip)]
    pub image_path: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub image_path: Option<String>,
}

impl NewMessage {
    /// Blank text is dropped; a message must keep text or an image.
    pub fn normalized(mut self) -> crate::Result<Self> {
        self.text = self.text
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());
        if self.image_url.is_none() {
            self.image_path = None;
        }
        if self.text.is_none() && self.image_url.is_none() {
            return Err(Error::validation("El mensaje necesita texto o una imagen"));
        }
        Ok(self)
    }
}

/// Creates the room if it is missing; an existing room is left untouched.
pub async fn ensure_room(db_pool: &SqlitePool, room_id: &str, name: &str) -> crate::Result<()> {
    sqlx::query("INSERT INTO chat_rooms (id,name,created_at) VALUES (?,?,?) ON CONFLICT(id) DO NOTHING")
        .bind(room_id)
        .bind(name)
        .bind(db::now_millis())
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn insert_message(db_pool: &SqlitePool, message: NewMessage) -> crate::Result<ChatMessage> {
    let message = message.normalized()?;
    let created_at = db::now_millis();

    let seq = sqlx::query("INSERT INTO chat_messages (room_id,user_id,user_name,text,image_url,image_path,created_at) VALUES (?,?,?,?,?,?,?)")
        .bind(&message.room_id)
        .bind(&message.user_id)
        .bind(&message.user_name)
        .bind(&message.text)
        .bind(&message.image_url)
        .bind(&message.image_path)
        .bind(created_at)
        .execute(db_pool)
        .await?
        .last_insert_rowid();

    Ok(ChatMessage {
        seq,
        room_id: message.room_id,
        user_id: message.user_id,
        user_name: message.user_name,
        text: message.text,
        image_url: message.image_url,
        image_path: message.image_path,
        created_at,
    })
}

/// The whole room log, oldest first.
pub async fn room_messages(db_pool: &SqlitePool, room_id: &str) -> crate::Result<Vec<ChatMessage>> {
    Ok(
        sqlx::query_as::<_, ChatMessage>(
            "SELECT seq,room_id,user_id,user_name,text,image_url,image_path,created_at FROM chat_messages \
             WHERE room_id=? ORDER BY created_at ASC, seq ASC"
        )
            .bind(room_id)
            .fetch_all(db_pool)
            .await?
    )
}
