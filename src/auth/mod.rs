//! Identity provider: email/password accounts, federated OAuth sign-in,
//! sign-out and password changes.

use axum::{routing::{get, post}, Router};
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

mod clients;
mod lockin;
mod login;
mod logout;
pub mod password;

pub use clients::{ClientProvider, Clients};

use crate::{session::USER_ID, users::{self, NewUser, UserProfile}, AppState, Error};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(login::auth_page))
        .route("/auth/signin", post(login::sign_in))
        .route("/auth/signup", post(login::sign_up))
        .route("/auth/oauth/{provider}", get(login::login))
        .route("/auth/oauth/{provider}/callback", get(lockin::lockin))
        .route("/auth/signout", get(logout::logout))
}

fn validate_new_password(password: &str) -> crate::Result<()> {
    if password.chars().count() < password::MIN_LEN {
        return Err(Error::validation(format!(
            "La contraseña debe tener al menos {} caracteres", password::MIN_LEN
        )));
    }
    Ok(())
}

pub async fn register(
    db_pool: &SqlitePool,
    email: &str,
    password: &str,
    display_name: Option<&str>,
) -> crate::Result<UserProfile> {
    let email = email.trim();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(Error::validation("Introduce un correo válido"));
    }
    validate_new_password(password)?;

    users::create(db_pool, NewUser {
        email,
        display_name,
        password_hash: Some(password::hash_password(password)?),
        provider: None,
    }).await
}

pub async fn sign_in_with_password(db_pool: &SqlitePool, email: &str, password: &str) -> crate::Result<UserProfile> {
    let rejected = || Error::Unauthorized("Correo o contraseña incorrectos".to_owned());

    let profile = users::find_by_email(db_pool, email).await?.ok_or_else(rejected)?;
    match &profile.password_hash {
        Some(hash) if password::verify_password(password, hash) => Ok(profile),
        _ => Err(rejected()),
    }
}

/// Replaces the password after re-checking the current one.
pub async fn change_password(
    db_pool: &SqlitePool,
    user_id: &str,
    current: &str,
    new: &str,
    confirm: &str,
) -> crate::Result<()> {
    if new != confirm {
        return Err(Error::validation("Las contraseñas no coinciden"));
    }
    validate_new_password(new)?;

    let profile = users::find(db_pool, user_id).await?.ok_or_else(|| Error::not_found("user"))?;
    let Some(hash) = &profile.password_hash else {
        return Err(Error::validation("Tu cuenta usa un proveedor externo y no tiene contraseña"));
    };
    if !password::verify_password(current, hash) {
        return Err(Error::Unauthorized("La contraseña actual es incorrecta".to_owned()));
    }

    users::set_password_hash(db_pool, user_id, &password::hash_password(new)?).await?;
    info!("u/{user_id} changed password");
    Ok(())
}

pub(crate) async fn start_session(session: &Session, user_id: &str) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(USER_ID, user_id).await
}

/// Only same-site relative paths are followed after sign-in.
pub(crate) fn safe_return_url(return_url: Option<&str>) -> &str {
    match return_url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => url,
        _ => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let db_pool = db::memory().await.unwrap();
        let user = register(&db_pool, "rosa@example.com", "pimiento", Some("Rosa")).await.unwrap();

        let signed_in = sign_in_with_password(&db_pool, "ROSA@example.com", "pimiento").await.unwrap();
        assert_eq!(signed_in.id, user.id);

        assert!(matches!(
            sign_in_with_password(&db_pool, "rosa@example.com", "pimienta").await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            sign_in_with_password(&db_pool, "nadie@example.com", "pimiento").await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn registration_validates_input() {
        let db_pool = db::memory().await.unwrap();

        assert!(matches!(register(&db_pool, "rosa", "pimiento", None).await, Err(Error::Validation(_))));
        assert!(matches!(register(&db_pool, "rosa@example.com", "corta", None).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn password_change_requires_current_password() {
        let db_pool = db::memory().await.unwrap();
        let user = register(&db_pool, "teo@example.com", "aceitunas", None).await.unwrap();

        let wrong = change_password(&db_pool, &user.id, "olivas", "garbanzos", "garbanzos").await;
        assert!(matches!(wrong, Err(Error::Unauthorized(_))));

        let mismatch = change_password(&db_pool, &user.id, "aceitunas", "garbanzos", "lentejas").await;
        assert!(matches!(mismatch, Err(Error::Validation(_))));

        change_password(&db_pool, &user.id, "aceitunas", "garbanzos", "garbanzos").await.unwrap();
        assert!(sign_in_with_password(&db_pool, "teo@example.com", "garbanzos").await.is_ok());
        assert!(sign_in_with_password(&db_pool, "teo@example.com", "aceitunas").await.is_err());
    }

    #[test]
    fn return_urls_stay_on_site() {
        assert_eq!(safe_return_url(Some("/chat")), "/chat");
        assert_eq!(safe_return_url(Some("//evil.example")), "/");
        assert_eq!(safe_return_url(Some("https://evil.example")), "/");
        assert_eq!(safe_return_url(None), "/");
    }
}
