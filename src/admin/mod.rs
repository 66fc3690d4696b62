//! Moderation screens. Every handler takes [`AdminUser`](crate::session::AdminUser),
//! so visitors land on `/auth` and members on `/`.

mod feedback;
mod recipes;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};

use crate::{storage::MAX_IMAGE_BYTES, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(recipes::list))
        .route("/recipes/new", get(recipes::new_page).post(recipes::create))
        .route("/recipes/{id}/edit", get(recipes::edit_page).post(recipes::update))
        .route("/recipes/{id}/delete", post(recipes::delete))
        .route(
            "/recipes/{id}/image",
            post(recipes::upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
        .route("/feedback", get(feedback::list))
        .route("/feedback/{id}/status", post(feedback::set_status))
}
