//! Cookie-session keys and the per-request session context.
//!
//! Gated handlers take [`CurrentUser`] or [`AdminUser`] as an extractor. The
//! profile is loaded once per request and cached in the request extensions;
//! signing out flushes the session so the next request resolves nothing.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::warn;

use crate::{res, users::{self, Role}, AppError};

pub const USER_ID: &str = "user_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";
pub const RECENT_SEARCHES: &str = "recent_searches";

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl CurrentUser {
    /// Resolves the session without redirecting; `None` for visitors.
    pub async fn resolve(session: &Session, db_pool: &SqlitePool) -> Result<Option<Self>, AppError> {
        let Some(user_id) = session.get::<String>(USER_ID).await? else {
            return Ok(None);
        };

        match users::find(db_pool, &user_id).await? {
            Some(profile) => Ok(Some(CurrentUser {
                id: profile.id,
                email: profile.email,
                display_name: profile.display_name,
                role: profile.role,
            })),
            None => {
                warn!("session for missing u/{user_id}, clearing");
                session.flush().await?;
                Ok(None)
            }
        }
    }
}

fn to_login(parts: &Parts) -> Response {
    let return_url = parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    Redirect::to(&format!("/auth?return_url={}", res::query_value(return_url))).into_response()
}


impl<S> FromRequestParts<S> for CurrentUser
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let db_pool = SqlitePool::from_ref(state);

        match CurrentUser::resolve(&session, &db_pool).await {
            Ok(Some(user)) => {
                parts.extensions.insert(user.clone());
                Ok(user)
            }
            Ok(None) => Err(to_login(parts)),
            Err(err) => Err(err.into_response()),
        }
    }
}

/// A signed-in user whose role grants the moderation screens.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl<S> FromRequestParts<S> for AdminUser
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(Redirect::to("/").into_response());
        }
        Ok(AdminUser(user))
    }
}

/// Most-recent-first search history, capped at [`RecentSearches::CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentSearches(Vec<String>);

impl RecentSearches {
    pub const CAPACITY: usize = 3;

    pub fn push(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        let lowered = query.to_lowercase();
        self.0.retain(|q| q.to_lowercase() != lowered);
        self.0.insert(0, query.to_owned());
        self.0.truncate(Self::CAPACITY);
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub async fn load(session: &Session) -> Result<Self, tower_sessions::session::Error> {
        Ok(session.get(RECENT_SEARCHES).await?.unwrap_or_default())
    }

    pub async fn record(session: &Session, query: &str) -> Result<Self, tower_sessions::session::Error> {
        let mut recent = Self::load(session).await?;
        recent.push(query);
        session.insert(RECENT_SEARCHES, &recent).await?;
        Ok(recent)
    }
}
