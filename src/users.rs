//! User profiles: identity, display name and role.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{db, Error};

text_enum! {
    /// Authorization level attached to a profile.
    pub enum Role {
        Member => "none", "USUARIO";
        Admin => "admin", "ADMINISTRADOR";
        Propietary => "propietary", "PROPIETARIO";
    }
}

impl Role {
    /// Admins and owners both get the moderation screens.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Propietary)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(skip)]
    pub password_hash: Option<String>,
}

type ProfileRow = (String, String, String, String, Option<String>);

const PROFILE_COLUMNS: &str = "id,email,display_name,role,password_hash";

fn from_row((id, email, display_name, role, password_hash): ProfileRow) -> crate::Result<UserProfile> {
    Ok(UserProfile { id, email, display_name, role: role.parse()?, password_hash })
}

/// Display name fallback: the local part of the email.
pub fn default_display_name(email: &str) -> String {
    match email.split('@').next() {
        Some(local) if !local.is_empty() => local.to_owned(),
        _ => "Usuario".to_owned(),
    }
}

pub async fn find(db_pool: &SqlitePool, user_id: &str) -> crate::Result<Option<UserProfile>> {
    sqlx::query_as::<_, ProfileRow>(&format!("SELECT {PROFILE_COLUMNS} FROM users WHERE id=?"))
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .map(from_row)
        .transpose()
}

pub async fn find_by_email(db_pool: &SqlitePool, email: &str) -> crate::Result<Option<UserProfile>> {
    sqlx::query_as::<_, ProfileRow>(&format!("SELECT {PROFILE_COLUMNS} FROM users WHERE email=?"))
        .bind(email.trim().to_lowercase())
        .fetch_optional(db_pool)
        .await?
        .map(from_row)
        .transpose()
}

pub async fn find_by_provider(db_pool: &SqlitePool, provider: &str, subject: &str) -> crate::Result<Option<UserProfile>> {
    sqlx::query_as::<_, ProfileRow>(&format!("SELECT {PROFILE_COLUMNS} FROM users WHERE provider=? AND provider_subject=?"))
        .bind(provider)
        .bind(subject)
        .fetch_optional(db_pool)
        .await?
        .map(from_row)
        .transpose()
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub display_name: Option<&'a str>,
    pub password_hash: Option<String>,
    /// Federated identity: provider id and the provider's subject
    pub provider: Option<(&'a str, &'a str)>,
}

pub async fn create(db_pool: &SqlitePool, new: NewUser<'_>) -> crate::Result<UserProfile> {
    let email = new.email.trim().to_lowercase();
    if find_by_email(db_pool, &email).await?.is_some() {
        return Err(Error::validation("Ya existe una cuenta con ese correo"));
    }

    let id = Uuid::now_v7().to_string();
    let display_name = match new.display_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => default_display_name(&email),
    };
    let now = db::now_millis();
    let (provider, subject) = new.provider.unzip();

    sqlx::query("INSERT INTO users (id,email,display_name,role,password_hash,provider,provider_subject,created_at,updated_at) VALUES (?,?,?,?,?,?,?,?,?)")
        .bind(&id)
        .bind(&email)
        .bind(&display_name)
        .bind(Role::Member.as_str())
        .bind(&new.password_hash)
        .bind(provider)
        .bind(subject)
        .bind(now)
        .bind(now)
        .execute(db_pool)
        .await?;

    info!("adding u/{id} <{email}>, {display_name}");
    Ok(UserProfile { id, email, display_name, role: Role::Member, password_hash: new.password_hash })
}

pub async fn update_display_name(db_pool: &SqlitePool, user_id: &str, display_name: &str) -> crate::Result<()> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(Error::validation("El nombre no puede estar vacío"));
    }

    let updated = sqlx::query("UPDATE users SET display_name=?, updated_at=? WHERE id=?")
        .bind(display_name)
        .bind(db::now_millis())
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(Error::not_found("user"));
    }
    Ok(())
}

pub async fn set_password_hash(db_pool: &SqlitePool, user_id: &str, password_hash: &str) -> crate::Result<()> {
    sqlx::query("UPDATE users SET password_hash=?, updated_at=? WHERE id=?")
        .bind(password_hash)
        .bind(db::now_millis())
        .bind(user_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn set_role(db_pool: &SqlitePool, user_id: &str, role: Role) -> crate::Result<()> {
    let updated = sqlx::query("UPDATE users SET role=?, updated_at=? WHERE id=?")
        .bind(role.as_str())
        .bind(db::now_millis())
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(Error::not_found("user"));
    }
    info!("u/{user_id} is now {role}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admins_and_owners_moderate() {
        assert!(!Role::Member.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(Role::Propietary.is_admin());
        assert_eq!("propietary".parse::<Role>().unwrap(), Role::Propietary);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn display_name_falls_back_to_email() {
        assert_eq!(default_display_name("marta@example.com"), "marta");
        assert_eq!(default_display_name("@example.com"), "Usuario");
    }

    #[tokio::test]
    async fn create_then_promote() {
        let db_pool = db::memory().await.unwrap();
        let user = create(&db_pool, NewUser {
            email: " Ana@Example.com ",
            display_name: None,
            password_hash: None,
            provider: None,
        }).await.unwrap();

        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.display_name, "ana");
        assert_eq!(user.role, Role::Member);

        set_role(&db_pool, &user.id, Role::Admin).await.unwrap();
        update_display_name(&db_pool, &user.id, "Ana María").await.unwrap();

        let found = find_by_email(&db_pool, "ANA@example.com").await.unwrap().unwrap();
        assert_eq!(found.role, Role::Admin);
        assert_eq!(found.display_name, "Ana María");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let db_pool = db::memory().await.unwrap();
        let new = || NewUser { email: "luis@example.com", display_name: Some("Luis"), password_hash: None, provider: None };

        create(&db_pool, new()).await.unwrap();
        assert!(matches!(create(&db_pool, new()).await, Err(Error::Validation(_))));
    }
}
