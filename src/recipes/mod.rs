//! Recipe browsing for signed-in users: category listing, detail and search.

pub mod form;
pub mod store;

use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Response}, routing::get, Router};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{include_res, res, session::{CurrentUser, RecentSearches}, AppResult, AppState};

pub use store::{Difficulty, Recipe, RecipeDraft, RecipeFilter, RecipeType};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/recetas", get(recipes_page))
        .route("/receta/{id}", get(recipe_page))
        .route("/buscar", get(search_page))
}

pub(crate) fn card(recipe: &Recipe) -> String {
    format!(
        r#"<a class="recipe-card" href="/receta/{id}">{image}<h3>{title}</h3><span class="pill">{category}</span><span class="pill" style="background-color:{color}">{difficulty}</span></a>"#,
        id = res::escape(&recipe.id),
        image = match &recipe.image {
            Some(image) => format!(r#"<img src="{}" alt="" loading="lazy">"#, res::escape(&image.url)),
            None => String::new(),
        },
        title = res::escape(&recipe.title),
        category = recipe.recipe_type.label(),
        color = recipe.difficulty.color(),
        difficulty = recipe.difficulty.label(),
    )
}

fn cards(recipes: &[Recipe], empty: &str) -> String {
    if recipes.is_empty() {
        return format!(r#"<p class="empty">{empty}</p>"#);
    }
    recipes.iter().map(card).collect()
}

#[debug_handler(state = AppState)]
pub(crate) async fn recipes_page(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    Query(filter): Query<RecipeFilter>,
) -> AppResult<Response> {
    let link = |t: Option<RecipeType>, d: Option<Difficulty>| -> String {
        let mut query = Vec::new();
        if let Some(t) = t { query.push(format!("type={t}")); }
        if let Some(d) = d { query.push(format!("difficulty={d}")); }
        format!("/recetas?{}", query.join("&"))
    };

    let types: String = RecipeType::ALL.iter()
        .map(|t| format!(
            r#"<a class="recipe-type-card{}" href="{}">{}</a>"#,
            if filter.recipe_type == Some(*t) { " active" } else { "" },
            link(Some(*t), filter.difficulty),
            t.label()
        ))
        .collect();
    let difficulties: String = Difficulty::ALL.iter()
        .map(|d| format!(
            r#"<a class="difficulty-card{}" href="{}">{}</a>"#,
            if filter.difficulty == Some(*d) { " active" } else { "" },
            link(filter.recipe_type, Some(*d)),
            d.label()
        ))
        .collect();

    let recipes = store::list(&db_pool, filter).await?;

    let body = include_res!(str, "/pages/recipes.html")
        .replace("{types}", &types)
        .replace("{difficulties}", &difficulties)
        .replace("{recipes}", &cards(&recipes, "No hay recetas en esta categoría"));
    Ok(res::page("Recetas", Some(&user), &body).into_response())
}

fn steps_list(steps: &[String]) -> String {
    if steps.is_empty() {
        return r#"<p class="no-steps">No hay pasos disponibles</p>"#.to_owned();
    }
    steps.iter()
        .enumerate()
        .map(|(i, step)| format!(
            r#"<div class="step-item"><span class="step-badge">Paso {}</span><p class="step-text">{}</p></div>"#,
            i + 1, res::escape(step)
        ))
        .collect()
}

#[debug_handler(state = AppState)]
pub(crate) async fn recipe_page(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let Some(recipe) = store::get(&db_pool, &id).await? else {
        return Ok(res::sorry("receta"));
    };

    let ingredients: String = recipe.ingredients.iter()
        .map(|i| format!(r#"<div class="ingredient-item">{}</div>"#, res::escape(i)))
        .collect();
    let image = match &recipe.image {
        Some(image) => format!(r#"<img class="recipe-image" src="{}" alt="">"#, res::escape(&image.url)),
        None => String::new(),
    };

    let body = include_res!(str, "/pages/recipe.html")
        .replace("{id}", &res::escape(&recipe.id))
        .replace("{title}", &res::escape(&recipe.title))
        .replace("{image}", &image)
        .replace("{category}", recipe.recipe_type.label())
        .replace("{difficulty}", recipe.difficulty.label())
        .replace("{difficulty_color}", recipe.difficulty.color())
        .replace("{ingredients}", &ingredients)
        .replace("{steps_adults}", &steps_list(&recipe.steps_adults))
        .replace("{steps_children}", &steps_list(&recipe.steps_children));
    Ok(res::page(&recipe.title, Some(&user), &body).into_response())
}

#[derive(Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn search_page(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(SearchQuery { q }): Query<SearchQuery>,
) -> AppResult<Response> {
    let q = q.trim();
    let results = if q.is_empty() {
        String::new()
    } else {
        RecentSearches::record(&session, q).await?;
        let found = store::search(&db_pool, q).await?;
        cards(&found, "No se encontraron recetas")
    };

    let body = include_res!(str, "/pages/search.html")
        .replace("{q}", &res::escape(q))
        .replace("{results}", &results);
    Ok(res::page("Buscar", Some(&user), &body).into_response())
}
