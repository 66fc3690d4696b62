use axum::{
    debug_handler,
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{include_res, recipes::store, res, session::{CurrentUser, RecentSearches}, AppResult, AppState, Markdown};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/guia", get(manual))
}

/// How many of the newest recipes the home page shows.
const LATEST: usize = 4;

#[debug_handler(state = AppState)]
async fn home(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let recent = RecentSearches::load(&session).await?;
    let recent_html: String = if recent.entries().is_empty() {
        String::new()
    } else {
        let links: String = recent.entries().iter()
            .map(|q| format!(
                r#"<a class="chip" href="/buscar?q={}">{}</a>"#,
                res::escape(&res::query_value(q)), res::escape(q)
            ))
            .collect();
        format!(r#"<section class="recent"><h3>Búsquedas recientes</h3>{links}</section>"#)
    };

    let latest: String = store::list(&db_pool, Default::default()).await?
        .iter()
        .take(LATEST)
        .map(crate::recipes::card)
        .collect();

    let body = include_res!(str, "/pages/home.html")
        .replace("{name}", &res::escape(&user.display_name))
        .replace("{recent}", &recent_html)
        .replace("{latest}", &latest);
    Ok(res::page("Inicio", Some(&user), &body).into_response())
}


#[debug_handler(state = AppState)]
async fn manual(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let user = CurrentUser::resolve(&session, &db_pool).await?;
    let html = Markdown(include_res!(str, "/pages/manual.md")).to_html();
    Ok(res::page("Guía de uso", user.as_ref(), &format!(r#"<article class="manual">{html}</article>"#)).into_response())
}

/// Unknown paths go home.
pub async fn fallback() -> Redirect {
    Redirect::to("/")
}
