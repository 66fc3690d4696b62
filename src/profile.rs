//! The signed-in user's own profile: display name and password.

use axum::{
    debug_handler,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{auth, include_res, res, session::CurrentUser, users, AppResult, AppState, Error};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/perfil", get(profile_page))
        .route("/perfil/nombre", post(update_name))
        .route("/perfil/password", post(update_password))
}

#[derive(Deserialize)]
pub(crate) struct SavedQuery {
    saved: Option<String>,
}

async fn render(
    db_pool: &SqlitePool,
    user: &CurrentUser,
    notice: String,
    status: StatusCode,
) -> AppResult<Response> {
    let profile = users::find(db_pool, &user.id).await?
        .ok_or_else(|| Error::not_found("user"))?;

    let password_section = if profile.password_hash.is_some() {
        include_res!(str, "/pages/profile_password.html").to_owned()
    } else {
        r#"<p class="muted">Tu cuenta usa un proveedor externo para iniciar sesión.</p>"#.to_owned()
    };

    let body = include_res!(str, "/pages/profile.html")
        .replace("{notice}", &notice)
        .replace("{email}", &res::escape(&profile.email))
        .replace("{display_name}", &res::escape(&profile.display_name))
        .replace("{role}", profile.role.label())
        .replace("{password}", &password_section);
    Ok((status, res::page("Perfil", Some(user), &body)).into_response())
}

#[debug_handler(state = AppState)]
async fn profile_page(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    Query(SavedQuery { saved }): Query<SavedQuery>,
) -> AppResult<Response> {
    let saved = match saved.as_deref() {
        Some("nombre") => Some("Nombre actualizado"),
        Some("password") => Some("Contraseña actualizada"),
        _ => None,
    };
    render(&db_pool, &user, res::notice("success", saved), StatusCode::OK).await
}

/// Validation and wrong-password failures stay on the page as a notice.
async fn rejected(db_pool: &SqlitePool, user: &CurrentUser, err: Error) -> AppResult<Response> {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => return Err(err.into()),
    };
    render(db_pool, user, res::notice("error", Some(&err.to_string())), status).await
}

#[derive(Deserialize)]
pub(crate) struct NameForm {
    display_name: String,
}

#[debug_handler(state = AppState)]
async fn update_name(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(NameForm { display_name }): Form<NameForm>,
) -> AppResult<Response> {
    match users::update_display_name(&db_pool, &user.id, &display_name).await {
        Ok(()) => Ok(Redirect::to("/perfil?saved=nombre").into_response()),
        Err(err) => rejected(&db_pool, &user, err).await,
    }
}

#[derive(Deserialize)]
pub(crate) struct PasswordForm {
    current: String,
    new: String,
    confirm: String,
}

#[debug_handler(state = AppState)]
async fn update_password(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(PasswordForm { current, new, confirm }): Form<PasswordForm>,
) -> AppResult<Response> {
    match auth::change_password(&db_pool, &user.id, &current, &new, &confirm).await {
        Ok(()) => Ok(Redirect::to("/perfil?saved=password").into_response()),
        Err(err) => rejected(&db_pool, &user, err).await,
    }
}
