//! Router-level tests: gates, redirects and the form flows, driven through
//! the full middleware stack with `oneshot`.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use culinarea::{
    auth::Clients,
    chat::ChatHub,
    db, feedback::{self, FeedbackStatus},
    narration::{Narrator, SilentDevice},
    recipes::store,
    storage::LocalStore,
    users::{self, Role},
    AppState,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    db_pool: SqlitePool,
    _files: TempDir,
}

async fn setup() -> TestApp {
    let db_pool = db::memory().await.unwrap();
    let files = tempfile::tempdir().unwrap();

    let state = AppState {
        chat: ChatHub::new(db_pool.clone()),
        db_pool: db_pool.clone(),
        clients: Clients::default(),
        narrator: Narrator::new(Arc::new(SilentDevice::default()), Duration::from_millis(10), "es"),
        storage: Arc::new(LocalStore::new(files.path(), "/files")),
    };

    TestApp {
        router: culinarea::app(state, files.path(), time::Duration::minutes(5)),
        db_pool,
        _files: files,
    }
}

struct Reply {
    status: StatusCode,
    location: Option<String>,
    cookie: Option<String>,
    body: String,
}

impl TestApp {
    async fn request(&self, method: Method, path: &str, cookie: Option<&str>, form: Option<&str>) -> Reply {
        let mut request = Request::builder().method(method).uri(path);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match form {
            Some(form) => request
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_owned()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let header_text = |name: header::HeaderName| response.headers().get(name).map(|v: &header::HeaderValue| v.to_str().unwrap().to_owned());
        let location = header_text(header::LOCATION);
        let cookie = header_text(header::SET_COOKIE)
            .map(|c| c.split(';').next().unwrap().to_owned());
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        Reply { status, location, cookie, body: String::from_utf8_lossy(&body).into_owned() }
    }

    async fn get(&self, path: &str, cookie: Option<&str>) -> Reply {
        self.request(Method::GET, path, cookie, None).await
    }

    async fn post(&self, path: &str, cookie: Option<&str>, form: &str) -> Reply {
        self.request(Method::POST, path, cookie, Some(form)).await
    }

    /// Registers through the sign-up form and returns the session cookie.
    async fn sign_up(&self, email: &str) -> String {
        let reply = self.post("/auth/signup", None, &format!("email={email}&password=cebolla1&display_name=Prueba")).await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        reply.cookie.expect("sign-up sets a session cookie")
    }
}

#[tokio::test]
async fn anonymous_visitors_are_sent_to_sign_in() {
    let app = setup().await;

    let reply = app.get("/recetas?type=sweet", None).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some("/auth?return_url=%2Frecetas%3Ftype%3Dsweet"));

    let reply = app.get("/buscar?q=pan%26vino", None).await;
    assert_eq!(reply.location.as_deref(), Some("/auth?return_url=%2Fbuscar%3Fq%3Dpan%2526vino"));

    let reply = app.get("/admin/recipes", None).await;
    assert!(reply.location.unwrap().starts_with("/auth"));

    assert_eq!(app.get("/auth", None).await.status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_paths_go_home() {
    let app = setup().await;
    let reply = app.get("/videos/123", None).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some("/"));
}

#[tokio::test]
async fn admin_screens_need_an_admin_role() {
    let app = setup().await;
    let cookie = app.sign_up("lucia%40example.com").await;

    let reply = app.get("/admin/recipes", Some(&cookie)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some("/"));

    let user = users::find_by_email(&app.db_pool, "lucia@example.com").await.unwrap().unwrap();
    users::set_role(&app.db_pool, &user.id, Role::Propietary).await.unwrap();

    let reply = app.get("/admin/recipes", Some(&cookie)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("Administrar recetas"));
}

#[tokio::test]
async fn signing_out_ends_the_session() {
    let app = setup().await;
    let cookie = app.sign_up("pablo%40example.com").await;
    assert_eq!(app.get("/", Some(&cookie)).await.status, StatusCode::OK);

    app.get("/auth/signout", Some(&cookie)).await;
    let reply = app.get("/", Some(&cookie)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn anonymous_feedback_is_stored_as_new() {
    let app = setup().await;

    let reply = app.post("/ayuda", None, "subject=Bug&message=App+crashes").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("Gracias"));

    let stored = feedback::list(&app.db_pool, None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].subject, "Bug");
    assert_eq!(stored[0].message, "App crashes");
    assert_eq!(stored[0].status, FeedbackStatus::New);
    assert_eq!(stored[0].user_id, None);

    let reply = app.post("/ayuda", None, "subject=&message=").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_marks_feedback_replied() {
    let app = setup().await;
    let cookie = app.sign_up("ines%40example.com").await;
    let user = users::find_by_email(&app.db_pool, "ines@example.com").await.unwrap().unwrap();
    users::set_role(&app.db_pool, &user.id, Role::Admin).await.unwrap();

    app.post("/ayuda", Some(&cookie), "subject=Bug&message=App+crashes").await;
    let entry = feedback::list(&app.db_pool, None).await.unwrap().remove(0);
    assert_eq!(entry.user_id.as_deref(), Some(user.id.as_str()));

    let reply = app.post(&format!("/admin/feedback/{}/status", entry.id), Some(&cookie), "status=replied&filter=new").await;
    assert_eq!(reply.location.as_deref(), Some("/admin/feedback?filter=new"));

    let replied = app.get("/admin/feedback?filter=replied", Some(&cookie)).await;
    assert!(replied.body.contains("App crashes"));
    let new = app.get("/admin/feedback?filter=new", Some(&cookie)).await;
    assert!(!new.body.contains("App crashes"));
}

#[tokio::test]
async fn recipe_form_keeps_ingredient_order() {
    let app = setup().await;
    let cookie = app.sign_up("chef%40example.com").await;
    let user = users::find_by_email(&app.db_pool, "chef@example.com").await.unwrap().unwrap();
    users::set_role(&app.db_pool, &user.id, Role::Admin).await.unwrap();

    let reply = app.post(
        "/admin/recipes/new",
        Some(&cookie),
        "title=Pan+de+pl%C3%A1tano&difficulty=beginner&category=sweet&ingredients=2+bananas%0A1+cup+flour&steps_adults=&steps_children=",
    ).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);

    let id = reply.location.unwrap()
        .trim_start_matches("/admin/recipes/")
        .trim_end_matches("/edit")
        .to_owned();
    let recipe = store::get(&app.db_pool, &id).await.unwrap().unwrap();
    assert_eq!(recipe.ingredients, ["2 bananas", "1 cup flour"]);
    assert!(recipe.steps_adults.is_empty());

    let missing = app.post("/admin/recipes/new", Some(&cookie), "title=Sin+ingredientes&difficulty=beginner&category=sweet").await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert!(missing.body.contains("Sin ingredientes"));
}

#[tokio::test]
async fn recipe_text_is_not_treated_as_a_placeholder() {
    let app = setup().await;
    let cookie = app.sign_up("pablo%40example.com").await;
    let recipe = store::create(&app.db_pool, &store::RecipeDraft {
        title: "{ingredients}".to_owned(),
        ingredients: vec!["azafrán".to_owned()],
        difficulty: store::Difficulty::Beginner,
        recipe_type: store::RecipeType::Salty,
        steps_adults: vec!["{steps_children}".to_owned()],
        steps_children: vec![],
    }).await.unwrap();

    let page = app.get(&format!("/receta/{}", recipe.id), Some(&cookie)).await.body;
    assert!(page.contains("<h1>&#123;ingredients&#125;</h1>"));
    assert!(page.contains("&#123;steps_children&#125;"));
    assert_eq!(page.matches("azafrán").count(), 1);
}

#[tokio::test]
async fn narration_starts_and_cancels() {
    let app = setup().await;
    let cookie = app.sign_up("nora%40example.com").await;
    let recipe = store::create(&app.db_pool, &store::RecipeDraft {
        title: "Batido".to_owned(),
        ingredients: vec!["2 bananas".to_owned()],
        difficulty: store::Difficulty::Beginner,
        recipe_type: store::RecipeType::Healthy,
        steps_adults: vec![],
        steps_children: vec!["Pela las bananas".to_owned()],
    }).await.unwrap();

    let reply = app.request(Method::POST, &format!("/receta/{}/narration/steps?audience=child", recipe.id), Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let state: Value = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(state["state"], "speaking");
    assert_eq!(state["target"], "steps");
    assert_eq!(state["total"], 2);

    let reply = app.request(Method::DELETE, "/narration", Some(&cookie), None).await;
    let state: Value = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(state["state"], "idle");

    let reply = app.request(Method::POST, "/receta/nope/narration/steps", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    let reply = app.request(Method::POST, &format!("/receta/{}/narration/video", recipe.id), Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn narration_belongs_to_whoever_started_it() {
    let app = setup().await;
    let alice = app.sign_up("alice%40example.com").await;
    let bob = app.sign_up("bob%40example.com").await;
    let recipe = store::create(&app.db_pool, &store::RecipeDraft {
        title: "Gazpacho".to_owned(),
        ingredients: vec!["1 kg de tomates".to_owned(), "1 pepino".to_owned()],
        difficulty: store::Difficulty::Beginner,
        recipe_type: store::RecipeType::Healthy,
        steps_adults: vec!["Tritura todo".to_owned()],
        steps_children: vec![],
    }).await.unwrap();
    let status = |reply: Reply| -> Value { serde_json::from_str(&reply.body).unwrap() };

    let reply = app.request(Method::POST, &format!("/receta/{}/narration/ingredients", recipe.id), Some(&alice), None).await;
    assert_eq!(status(reply)["state"], "speaking");

    assert_eq!(status(app.get("/narration", Some(&bob)).await)["state"], "idle");
    let reply = app.request(Method::DELETE, "/narration", Some(&bob), None).await;
    assert_eq!(status(reply)["state"], "idle");
    assert_eq!(status(app.get("/narration", Some(&alice)).await)["target"], "ingredients");

    // the device is shared, so Bob starting takes it over
    let reply = app.request(Method::POST, &format!("/receta/{}/narration/steps", recipe.id), Some(&bob), None).await;
    assert_eq!(status(reply)["state"], "speaking");
    assert_eq!(status(app.get("/narration", Some(&alice)).await)["state"], "idle");
    assert_eq!(status(app.get("/narration", Some(&bob)).await)["target"], "steps");
}

#[tokio::test]
async fn search_is_remembered_on_the_home_page() {
    let app = setup().await;
    let cookie = app.sign_up("olga%40example.com").await;

    for q in ["flan", "tortilla", "gazpacho", "croquetas"] {
        let reply = app.get(&format!("/buscar?q={q}"), Some(&cookie)).await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    let home = app.get("/", Some(&cookie)).await.body;
    assert!(home.contains("croquetas"));
    assert!(home.contains("gazpacho"));
    assert!(home.contains("tortilla"));
    assert!(!home.contains(">flan<"));

    app.get("/buscar?q=pan+%26+vino", Some(&cookie)).await;
    let home = app.get("/", Some(&cookie)).await.body;
    assert!(home.contains(r#"href="/buscar?q=pan+%26+vino">pan &amp; vino<"#));
}

#[tokio::test]
async fn manual_is_public() {
    let app = setup().await;
    let reply = app.get("/guia", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("<h1>Instructivo Culinárea</h1>"));
    assert!(reply.body.contains("<table>"));
}
