use axum::{
    debug_handler,
    extract::{Multipart, Path, State},
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::{session::CurrentUser, storage::{self, ObjectStore, Storage, StoredObject}, AppResult, Error};

use super::rooms;

/// Stores a chat image under `chat/{room}/{user}/{uuid}.{ext}`.
pub async fn upload_chat_image(
    store: &dyn ObjectStore,
    room_id: &str,
    user_id: &str,
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> crate::Result<StoredObject> {
    if rooms::find(room_id).is_none() {
        return Err(Error::not_found(format!("room {room_id}")));
    }
    let ext = storage::check_image(content_type, bytes.len())?;
    let path = format!("{}{}.{ext}", upload_prefix(room_id, user_id), Uuid::now_v7());
    store.put(&path, bytes).await
}

/// Where a user's uploads for a room live; sends may only reference these.
pub fn upload_prefix(room_id: &str, user_id: &str) -> String {
    format!("chat/{room_id}/{user_id}/")
}

#[debug_handler(state = crate::AppState)]
pub async fn upload(
    user: CurrentUser,
    State(store): State<Storage>,
    Path(room_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Json<StoredObject>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await?;

        let stored = upload_chat_image(&*store, &room_id, &user.id, content_type.as_deref(), bytes.to_vec()).await?;
        info!("u/{} uploaded {}", user.id, stored.path);
        return Ok(Json(stored));
    }
    Err(Error::validation("Por favor selecciona un archivo de imagen válido").into())
}
