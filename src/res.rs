use axum::{http::StatusCode, response::{Html, IntoResponse, Response}};
use oauth2::url::form_urlencoded;

use crate::session::CurrentUser;

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

/// Escapes text for use inside HTML element bodies and quoted attributes.
/// Braces are escaped too, so user text can never form a `{placeholder}`
/// that a later template substitution would fill.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            c => out.push(c),
        }
    }
    out
}

/// Encodes `text` as one `application/x-www-form-urlencoded` query value.
pub fn query_value(text: &str) -> String {
    form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

/// Wraps a page body in the site layout.
pub fn page(title: &str, user: Option<&CurrentUser>, body: &str) -> Html<String> {
    Html(
        include_res!(str, "/pages/layout.html")
            .replace("{title}", &escape(title))
            .replace("{nav}", &nav(user))
            .replace("{body}", body)
    )
}

fn nav(user: Option<&CurrentUser>) -> String {
    let Some(user) = user else {
        return r#"<a href="/guia">Guía</a><a href="/ayuda">Ayuda</a><a href="/auth">Entrar</a>"#.to_owned();
    };

    let mut links = String::from(
        r#"<a href="/">Inicio</a><a href="/recetas">Recetas</a><a href="/chat">Chat</a><a href="/guia">Guía</a><a href="/ayuda">Ayuda</a>"#
    );
    if user.role.is_admin() {
        links += r#"<a href="/admin/recipes">Recetas (admin)</a><a href="/admin/feedback">Comentarios</a>"#;
    }
    links += &format!(
        r#"<a href="/perfil">{}</a><a href="/auth/signout">Salir</a>"#,
        escape(&user.display_name)
    );
    links
}

/// Inline error or success box; empty when there is nothing to say.
pub fn notice(kind: &str, message: Option<&str>) -> String {
    match message {
        Some(message) => format!(r#"<div class="notice {kind}">{}</div>"#, escape(message)),
        None => String::new(),
    }
}

pub fn sorry(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        page(
            "No encontrado",
            None,
            &include_res!(str, "/pages/sorry.html").replace("{what}", &escape(what)),
        ),
    )
        .into_response()
}
