//! Help page and user feedback. Anyone may send feedback; admins triage it.

use axum::{
    debug_handler,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;
use uuid::Uuid;

use crate::{db, include_res, res, session::CurrentUser, AppResult, AppState, Error};

text_enum! {
    pub enum FeedbackStatus {
        New => "new", "NUEVO";
        Read => "read", "LEÍDO";
        Replied => "replied", "RESPONDIDO";
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: String,
    pub message: String,
    pub user_id: Option<String>,
    pub status: FeedbackStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

type FeedbackRow = (String, Option<String>, Option<String>, String, String, Option<String>, String, i64, i64);

const COLUMNS: &str = "id,name,email,subject,message,user_id,status,created_at,updated_at";

fn from_row((id, name, email, subject, message, user_id, status, created_at, updated_at): FeedbackRow) -> crate::Result<Feedback> {
    Ok(Feedback { id, name, email, subject, message, user_id, status: status.parse()?, created_at, updated_at })
}

fn non_blank(text: &str) -> Option<String> {
    Some(text.trim()).filter(|t| !t.is_empty()).map(str::to_owned)
}

/// Stores a new entry with status `new`. Subject and message are required.
pub async fn create(db_pool: &SqlitePool, form: &FeedbackForm, user_id: Option<&str>) -> crate::Result<Feedback> {
    let (Some(subject), Some(message)) = (non_blank(&form.subject), non_blank(&form.message)) else {
        return Err(Error::validation("Por favor completa el asunto y el mensaje"));
    };

    let feedback = Feedback {
        id: Uuid::now_v7().to_string(),
        name: non_blank(&form.name),
        email: non_blank(&form.email),
        subject,
        message,
        user_id: user_id.map(str::to_owned),
        status: FeedbackStatus::New,
        created_at: db::now_millis(),
        updated_at: db::now_millis(),
    };

    sqlx::query(&format!("INSERT INTO feedback ({COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?)"))
        .bind(&feedback.id)
        .bind(&feedback.name)
        .bind(&feedback.email)
        .bind(&feedback.subject)
        .bind(&feedback.message)
        .bind(&feedback.user_id)
        .bind(feedback.status.as_str())
        .bind(feedback.created_at)
        .bind(feedback.updated_at)
        .execute(db_pool)
        .await?;

    info!("feedback {} received: {}", feedback.id, feedback.subject);
    Ok(feedback)
}

pub async fn find(db_pool: &SqlitePool, id: &str) -> crate::Result<Option<Feedback>> {
    sqlx::query_as::<_, FeedbackRow>(&format!("SELECT {COLUMNS} FROM feedback WHERE id=?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .map(from_row)
        .transpose()
}

/// Newest first; `None` lists every status.
pub async fn list(db_pool: &SqlitePool, status: Option<FeedbackStatus>) -> crate::Result<Vec<Feedback>> {
    let rows = match status {
        Some(status) => sqlx::query_as::<_, FeedbackRow>(&format!("SELECT {COLUMNS} FROM feedback WHERE status=? ORDER BY created_at DESC, id DESC"))
            .bind(status.as_str())
            .fetch_all(db_pool)
            .await?,
        None => sqlx::query_as::<_, FeedbackRow>(&format!("SELECT {COLUMNS} FROM feedback ORDER BY created_at DESC, id DESC"))
            .fetch_all(db_pool)
            .await?,
    };
    rows.into_iter().map(from_row).collect()
}

pub async fn set_status(db_pool: &SqlitePool, id: &str, status: FeedbackStatus) -> crate::Result<()> {
    let updated = sqlx::query("UPDATE feedback SET status=?, updated_at=? WHERE id=?")
        .bind(status.as_str())
        .bind(db::now_millis())
        .bind(id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(Error::not_found(format!("feedback {id}")));
    }
    info!("feedback {id} marked {status}");
    Ok(())
}

/// How many entries carry each status, in [`FeedbackStatus::ALL`] order.
pub async fn counts(db_pool: &SqlitePool) -> crate::Result<Vec<(FeedbackStatus, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT status, COUNT(*) FROM feedback GROUP BY status")
        .fetch_all(db_pool)
        .await?;

    let mut counts: Vec<_> = FeedbackStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for (status, n) in rows {
        let status: FeedbackStatus = status.parse()?;
        if let Some(entry) = counts.iter_mut().find(|(s, _)| *s == status) {
            entry.1 = n;
        }
    }
    Ok(counts)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ayuda", get(help_page).post(send_feedback))
}

fn render_help(user: Option<&CurrentUser>, form: &FeedbackForm, notice: String) -> Response {
    let body = include_res!(str, "/pages/help.html")
        .replace("{notice}", &notice)
        .replace("{name}", &res::escape(&form.name))
        .replace("{email}", &res::escape(&form.email))
        .replace("{subject}", &res::escape(&form.subject))
        .replace("{message}", &res::escape(&form.message));
    res::page("Ayuda", user, &body).into_response()
}

#[debug_handler(state = AppState)]
async fn help_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let user = CurrentUser::resolve(&session, &db_pool).await?;
    let form = match &user {
        Some(user) => FeedbackForm {
            name: user.display_name.clone(),
            email: user.email.clone(),
            ..Default::default()
        },
        None => FeedbackForm::default(),
    };
    Ok(render_help(user.as_ref(), &form, String::new()))
}

#[debug_handler(state = AppState)]
async fn send_feedback(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(form): Form<FeedbackForm>,
) -> AppResult<Response> {
    let user = CurrentUser::resolve(&session, &db_pool).await?;

    match create(&db_pool, &form, user.as_ref().map(|u| u.id.as_str())).await {
        Ok(_) => {
            let kept = FeedbackForm { subject: String::new(), message: String::new(), ..form };
            Ok(render_help(user.as_ref(), &kept, res::notice("success", Some("¡Gracias! Hemos recibido tu mensaje"))))
        }
        Err(Error::Validation(msg)) => {
            let mut page = render_help(user.as_ref(), &form, res::notice("error", Some(&msg)));
            *page.status_mut() = StatusCode::BAD_REQUEST;
            Ok(page)
        }
        Err(err) => Err(err.into()),
    }
}
