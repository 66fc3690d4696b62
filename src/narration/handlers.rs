use std::convert::Infallible;

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{recipes::store, session::CurrentUser, AppResult, AppState, Error};

use super::{segments, Audience, NarrationState, Narrator, Target};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/receta/{id}/narration/{target}", post(start))
        .route("/narration", get(status).delete(cancel))
        .route("/narration/events", get(events))
        .route("/narration/voice", put(set_voice))
}

#[derive(Debug, Serialize)]
pub struct NarrationStatus {
    #[serde(flatten)]
    pub state: NarrationState,
    pub voice: String,
    pub alert: Option<String>,
}

impl NarrationStatus {
    fn of(narrator: &Narrator, user: &CurrentUser) -> Self {
        Self {
            state: narrator.state(&user.id),
            voice: narrator.voice(),
            alert: narrator.take_alert(&user.id),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct AudienceQuery {
    #[serde(default)]
    audience: Option<Audience>,
}

#[debug_handler(state = AppState)]
async fn start(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(narrator): State<Narrator>,
    Path((id, target)): Path<(String, String)>,
    Query(AudienceQuery { audience }): Query<AudienceQuery>,
) -> AppResult<Json<NarrationState>> {
    let target: Target = target.parse()?;
    let recipe = store::get(&db_pool, &id).await?
        .ok_or_else(|| Error::not_found(format!("recipe {id}")))?;

    let segments = segments::for_recipe(&recipe, target, audience.unwrap_or(Audience::Adult));
    Ok(Json(narrator.start(&user.id, target, segments)))
}

#[debug_handler(state = AppState)]
async fn cancel(user: CurrentUser, State(narrator): State<Narrator>) -> Json<NarrationState> {
    Json(narrator.cancel(&user.id))
}

#[debug_handler(state = AppState)]
async fn status(user: CurrentUser, State(narrator): State<Narrator>) -> Json<NarrationStatus> {
    Json(NarrationStatus::of(&narrator, &user))
}

/// Pushes the caller's narration events as they happen.
async fn events(
    user: CurrentUser,
    State(narrator): State<Narrator>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = narrator.events(&user.id).filter_map(|event| {
        future::ready(Event::default().event("narration").json_data(&event).ok().map(Ok))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
pub(crate) struct VoiceForm {
    voice: String,
}

#[debug_handler(state = AppState)]
async fn set_voice(
    user: CurrentUser,
    State(narrator): State<Narrator>,
    Json(VoiceForm { voice }): Json<VoiceForm>,
) -> AppResult<Json<NarrationStatus>> {
    let voice = voice.trim();
    if voice.is_empty() || !voice.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')) {
        return Err(Error::validation("Voz no válida").into());
    }
    narrator.set_voice(voice);
    Ok(Json(NarrationStatus::of(&narrator, &user)))
}
