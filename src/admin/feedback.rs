use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    feedback::{self, Feedback, FeedbackStatus},
    include_res, res,
    session::AdminUser,
    AppResult, AppState,
};

#[derive(Deserialize)]
pub(super) struct FilterQuery {
    #[serde(default)]
    filter: Option<String>,
}

/// `all` (or nothing) lists everything; otherwise a status name.
fn parse_filter(filter: Option<&str>) -> crate::Result<Option<FeedbackStatus>> {
    match filter {
        None | Some("") | Some("all") => Ok(None),
        Some(status) => status.parse().map(Some),
    }
}

fn date(millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

fn entry(feedback: &Feedback, filter: &str) -> String {
    let options: String = FeedbackStatus::ALL.iter()
        .map(|s| format!(
            r#"<option value="{s}"{}>{}</option>"#,
            if *s == feedback.status { " selected" } else { "" },
            s.label()
        ))
        .collect();
    let from = match (&feedback.name, &feedback.email) {
        (Some(name), Some(email)) => format!("{} &lt;{}&gt;", res::escape(name), res::escape(email)),
        (Some(who), None) | (None, Some(who)) => res::escape(who),
        (None, None) => "Anónimo".to_owned(),
    };

    format!(
        r#"<article class="feedback status-{status}"><header><h3>{subject}</h3><span class="pill">{label}</span></header><p class="meta">{from} · {date}</p><p>{message}</p><form method="post" action="/admin/feedback/{id}/status"><input type="hidden" name="filter" value="{filter}"><select name="status">{options}</select><button>Guardar</button></form></article>"#,
        status = feedback.status,
        subject = res::escape(&feedback.subject),
        label = feedback.status.label(),
        date = date(feedback.created_at),
        message = res::escape(&feedback.message),
        id = res::escape(&feedback.id),
        filter = res::escape(filter),
    )
}

#[debug_handler(state = AppState)]
pub(super) async fn list(
    AdminUser(user): AdminUser,
    State(db_pool): State<SqlitePool>,
    Query(FilterQuery { filter }): Query<FilterQuery>,
) -> AppResult<Response> {
    let status = parse_filter(filter.as_deref())?;
    let current = status.map_or("all", |s| s.as_str());

    let counts = feedback::counts(&db_pool).await?;
    let total: i64 = counts.iter().map(|(_, n)| n).sum();
    let tab = |value: &str, label: &str, n: i64| format!(
        r#"<a class="tab{}" href="/admin/feedback?filter={value}">{label} ({n})</a>"#,
        if value == current { " active" } else { "" }
    );
    let filters: String = std::iter::once(tab("all", "TODOS", total))
        .chain(counts.iter().map(|(s, n)| tab(s.as_str(), s.label(), *n)))
        .collect();

    let entries = feedback::list(&db_pool, status).await?;
    let entries: String = if entries.is_empty() {
        r#"<p class="empty">No hay comentarios</p>"#.to_owned()
    } else {
        entries.iter().map(|f| entry(f, current)).collect()
    };

    let body = include_res!(str, "/pages/admin_feedback.html")
        .replace("{filters}", &filters)
        .replace("{entries}", &entries);
    Ok(res::page("Comentarios", Some(&user), &body).into_response())
}

#[derive(Deserialize)]
pub(super) struct StatusForm {
    status: String,
    #[serde(default)]
    filter: Option<String>,
}

#[debug_handler(state = AppState)]
pub(super) async fn set_status(
    _admin: AdminUser,
    State(db_pool): State<SqlitePool>,
    Path(id): Path<String>,
    Form(StatusForm { status, filter }): Form<StatusForm>,
) -> AppResult<Response> {
    feedback::set_status(&db_pool, &id, status.parse()?).await?;
    let filter = parse_filter(filter.as_deref())?.map_or("all", |s| s.as_str());
    Ok(Redirect::to(&format!("/admin/feedback?filter={filter}")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters() {
        assert_eq!(parse_filter(None).unwrap(), None);
        assert_eq!(parse_filter(Some("all")).unwrap(), None);
        assert_eq!(parse_filter(Some("replied")).unwrap(), Some(FeedbackStatus::Replied));
        assert!(parse_filter(Some("spam")).is_err());
    }

    #[test]
    fn dates_are_rfc3339() {
        assert_eq!(date(0), "1970-01-01T00:00:00Z");
    }
}
