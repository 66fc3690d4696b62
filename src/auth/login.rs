use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Redirect, Response}, Form};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{include_res, res, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState, Error};

use super::{clients::ClientProvider, safe_return_url, start_session, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
    pub(crate) error: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SignInForm {
    email: String,
    password: String,
    return_url: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SignUpForm {
    email: String,
    password: String,
    display_name: Option<String>,
    return_url: Option<String>,
}

fn render(clients: &Clients, return_url: &str, error: Option<&str>, email: &str) -> String {
    let providers: String = clients.providers()
        .into_iter()
        .map(|p| format!(
            r#"<a class="button" href="/auth/oauth/{}?return_url={}">Entrar con {p}</a>"#,
            p.slug(), res::escape(&res::query_value(return_url))
        ))
        .collect();

    include_res!(str, "/pages/auth.html")
        .replace("{notice}", &res::notice("error", error))
        .replace("{return_url}", &res::escape(return_url))
        .replace("{email}", &res::escape(email))
        .replace("{providers}", &providers)
}

#[debug_handler(state = AppState)]
pub(crate) async fn auth_page(
    Query(LoginQuery { return_url, error }): Query<LoginQuery>,
    State(clients): State<Clients>,
) -> impl IntoResponse {
    let return_url = safe_return_url(return_url.as_deref());
    res::page("Entrar", None, &render(&clients, return_url, error.as_deref(), ""))
}

fn rejected(clients: &Clients, return_url: &str, email: &str, err: crate::Error) -> AppResult<Response> {
    let status = match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        err => return Err(err.into()),
    };
    Ok((
        status,
        res::page("Entrar", None, &render(clients, return_url, Some(&err_text(status)), email)),
    ).into_response())
}

fn err_text(status: StatusCode) -> String {
    match status {
        StatusCode::UNAUTHORIZED => "Correo o contraseña incorrectos".to_owned(),
        _ => "Revisa los datos del formulario".to_owned(),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn sign_in(
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    session: Session,
    Form(SignInForm { email, password, return_url }): Form<SignInForm>,
) -> AppResult<Response> {
    let return_url = safe_return_url(return_url.as_deref());
    match super::sign_in_with_password(&db_pool, &email, &password).await {
        Ok(profile) => {
            start_session(&session, &profile.id).await?;
            info!("welcome u/{}", profile.id);
            Ok(Redirect::to(return_url).into_response())
        }
        Err(err) => rejected(&clients, return_url, &email, err),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn sign_up(
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    session: Session,
    Form(SignUpForm { email, password, display_name, return_url }): Form<SignUpForm>,
) -> AppResult<Response> {
    let return_url = safe_return_url(return_url.as_deref());
    match super::register(&db_pool, &email, &password, display_name.as_deref()).await {
        Ok(profile) => {
            start_session(&session, &profile.id).await?;
            Ok(Redirect::to(return_url).into_response())
        }
        Err(Error::Validation(msg)) => Ok((
            StatusCode::BAD_REQUEST,
            res::page("Entrar", None, &render(&clients, return_url, Some(&msg), &email)),
        ).into_response()),
        Err(err) => rejected(&clients, return_url, &email, err),
    }
}

/// Starts federated sign-in: PKCE + CSRF state kept in the session.
#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url, .. }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scopes(provider.scopes().iter().map(|s| Scope::new(s.to_string())))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    session.insert(RETURN_URL, safe_return_url(return_url.as_deref())).await?;

    Ok(Redirect::to(authorize_url.as_str()).into_response())
}
