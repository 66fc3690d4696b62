//! Community chat: fixed category rooms, live snapshots over a WebSocket and
//! image uploads.

pub mod hub;
pub mod images;
pub mod rooms;
pub mod store;
pub mod stream;
pub mod ws;

use axum::{
    debug_handler,
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::{include_res, res, session::CurrentUser, storage::MAX_IMAGE_BYTES, AppState};

pub use hub::{ChatHub, Snapshot, Subscription};
pub use rooms::{Room, ROOMS};
pub use store::{ChatMessage, NewMessage};
pub use stream::ChatStream;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(chat_page))
        .route("/ws", get(ws::chat_ws))
        .route(
            "/{room}/images",
            post(images::upload).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
}

#[debug_handler(state = AppState)]
async fn chat_page(user: CurrentUser) -> Response {
    let rooms: String = ROOMS.iter()
        .map(|room| format!(
            r#"<button class="room" data-room="{id}" style="border-color:{color}"><span class="room-icon">{icon}</span>{name}</button>"#,
            id = room.id,
            color = room.color,
            icon = room.icon,
            name = room.name,
        ))
        .collect();

    let body = include_res!(str, "/pages/chat.html")
        .replace("{rooms}", &rooms)
        .replace("{user_id}", &res::escape(&user.id));
    res::page("Chat", Some(&user), &body).into_response()
}
