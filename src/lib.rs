/// Enums persisted as TEXT columns and posted through forms.
///
/// Each variant carries its stored/wire name and the Spanish label shown in pages.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $text:literal, $label:literal;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(crate::Error::Validation(
                        format!("unknown {} `{other}`", stringify!($name).to_lowercase())
                    )),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod admin;
pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod feedback;
pub mod narration;
pub mod pages;
pub mod profile;
pub mod recipes;
pub mod res;
pub mod session;
pub mod storage;
pub mod users;

use std::{ops::Deref, path::Path};

use axum::{extract::FromRef, response::{Html, IntoResponse}, Router};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};
pub use error::{Error, Result};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub chat: chat::ChatHub,
    pub narrator: narration::Narrator,
    pub storage: storage::Storage,
}

/// Every route of the site, with sessions and request tracing attached.
pub fn app(state: AppState, files_dir: &Path, session_ttl: time::Duration) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(session_ttl));

    Router::new()
        .merge(pages::router())
        .merge(auth::router())
        .merge(recipes::router())
        .merge(feedback::router())
        .merge(profile::router())
        .merge(narration::router())
        .nest("/chat", chat::router())
        .nest("/admin", admin::router())
        .nest_service("/files", ServeDir::new(files_dir))
        .fallback(pages::fallback)
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> anyhow::Result<String>;
    fn get_obj_field(&self, field: &str) -> anyhow::Result<&Value>;
    /// Ids come back as strings from some providers and numbers from others.
    fn get_id_field(&self, field: &str) -> anyhow::Result<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> anyhow::Result<String> {
        Ok(
            self.get(field)
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self}"))?
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> anyhow::Result<&Value> {
        self.get(field)
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self}"))
    }

    fn get_id_field(&self, field: &str) -> anyhow::Result<String> {
        match self.get_obj_field(field)? {
            Value::String(id) => Ok(id.clone()),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(anyhow::anyhow!("expected {field} to be an id, got {other}")),
        }
    }
}

pub struct Markdown<T>(pub T);

impl<T> Markdown<T>
where
    T: Deref<Target = str>
{
    pub fn to_html(&self) -> String {
        use pulldown_cmark::{Options, Parser};

        let parser = Parser::new_ext(&self.0, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);

        let mut html_output = String::new();
        pulldown_cmark::html::push_html(&mut html_output, parser);
        html_output
    }
}

impl<T> IntoResponse for Markdown<T>
where
    T: Deref<Target = str>
{
    fn into_response(self) -> axum::response::Response {
        Html(self.to_html()).into_response()
    }
}
