use anyhow::anyhow;
use axum::{debug_handler, extract::{Path, Query, State}, http::header::USER_AGENT, response::{IntoResponse, Redirect}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{res, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, users::{self, NewUser, UserProfile}, AppResult, AppState, Error, GetField};

use super::{clients::ClientProvider, safe_return_url, start_session, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// Identity fields pulled out of a provider's userinfo response.
#[derive(Debug, PartialEq)]
struct ProviderIdentity {
    subject: String,
    email: String,
    name: Option<String>,
}

fn identity(provider: ClientProvider, body: &Value) -> anyhow::Result<ProviderIdentity> {
    let subject = body.get_id_field("id")?;
    let name = body.get("name").and_then(Value::as_str).map(str::to_owned);
    let email = match provider {
        ClientProvider::Google => body.get_str_field("email")?,
        // private github emails come back null
        ClientProvider::Github => match body.get("email").and_then(Value::as_str) {
            Some(email) => email.to_owned(),
            None => format!("{}@users.noreply.github.com", body.get_str_field("login")?),
        },
    };
    let name = name.or_else(|| body.get("login").and_then(Value::as_str).map(str::to_owned));
    Ok(ProviderIdentity { subject, email, name })
}

/// The local account for a federated identity, created on first sign-in.
async fn profile_for(
    db_pool: &SqlitePool,
    provider: ClientProvider,
    identity: &ProviderIdentity,
) -> crate::Result<UserProfile> {
    if let Some(profile) = users::find_by_provider(db_pool, provider.id(), &identity.subject).await? {
        return Ok(profile);
    }
    users::create(db_pool, NewUser {
        email: &identity.email,
        display_name: identity.name.as_deref(),
        password_hash: None,
        provider: Some((provider.id(), &identity.subject)),
    }).await
}

/// Back to the sign-in screen with `message` shown as a notice.
fn refused(message: &str) -> Redirect {
    Redirect::to(&format!("/auth?error={}", res::query_value(message)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let state = CsrfToken::new(state.ok_or(anyhow!("OAuth: without state"))?);
    let code = AuthorizationCode::new(code.ok_or(anyhow!("OAuth: without code"))?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err(anyhow!("no csrf_state").into());
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err(anyhow!("csrf tokens don't match").into());
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err(anyhow!("no pkce_verifier").into());
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: Value = http_client.get(provider.userinfo_url())
        .bearer_auth(access_token)
        .header(USER_AGENT, "culinarea")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let identity = identity(provider, &body)?;

    let profile = match profile_for(&db_pool, provider, &identity).await {
        Ok(profile) => profile,
        Err(Error::Validation(message)) => {
            info!("{provider} sign-in refused: {message}");
            return Ok(refused(&message));
        }
        Err(err) => return Err(err.into()),
    };

    let return_url: Option<String> = session.remove(RETURN_URL).await?;
    start_session(&session, &profile.id).await?;
    info!("welcome u/{} via {provider}", profile.id);

    Ok(Redirect::to(safe_return_url(return_url.as_deref())))
}
