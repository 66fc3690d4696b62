use axum::{
    debug_handler,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    include_res,
    recipes::{form::RecipeForm, store, Recipe},
    res,
    session::AdminUser,
    storage::{self, Storage},
    AppResult, AppState, Error,
};

fn row(recipe: &Recipe) -> String {
    let id = res::escape(&recipe.id);
    format!(
        r#"<tr><td>{image}</td><td>{title}</td><td>{category}</td><td><span class="pill" style="background-color:{color}">{difficulty}</span></td><td class="actions"><a class="button" href="/admin/recipes/{id}/edit">Editar</a><form method="post" action="/admin/recipes/{id}/delete" onsubmit="return confirm('¿Eliminar esta receta?')"><button class="danger">Eliminar</button></form></td></tr>"#,
        image = match &recipe.image {
            Some(image) => format!(r#"<img class="thumb" src="{}" alt="">"#, res::escape(&image.url)),
            None => String::new(),
        },
        title = res::escape(&recipe.title),
        category = recipe.recipe_type.label(),
        color = recipe.difficulty.color(),
        difficulty = recipe.difficulty.label(),
    )
}

#[debug_handler(state = AppState)]
pub(super) async fn list(
    AdminUser(user): AdminUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let recipes = store::list(&db_pool, Default::default()).await?;
    let rows: String = if recipes.is_empty() {
        r#"<tr><td colspan="5" class="empty">Todavía no hay recetas</td></tr>"#.to_owned()
    } else {
        recipes.iter().map(row).collect()
    };

    let body = include_res!(str, "/pages/admin_recipes.html")
        .replace("{count}", &recipes.len().to_string())
        .replace("{recipes}", &rows);
    Ok(res::page("Administrar recetas", Some(&user), &body).into_response())
}

fn form_page(user: &AdminUser, title: &str, body: String, status: StatusCode) -> Response {
    (status, res::page(title, Some(&user.0), &body)).into_response()
}

#[debug_handler(state = AppState)]
pub(super) async fn new_page(admin: AdminUser) -> Response {
    let body = RecipeForm::default().render("Nueva receta", "/admin/recipes/new", None);
    form_page(&admin, "Nueva receta", body, StatusCode::OK)
}

#[debug_handler(state = AppState)]
pub(super) async fn create(
    admin: AdminUser,
    State(db_pool): State<SqlitePool>,
    Form(form): Form<RecipeForm>,
) -> AppResult<Response> {
    match form.clone().into_draft() {
        Ok(draft) => {
            let recipe = store::create(&db_pool, &draft).await?;
            info!("u/{} created recipe {}", admin.0.id, recipe.id);
            Ok(Redirect::to(&format!("/admin/recipes/{}/edit", recipe.id)).into_response())
        }
        Err(Error::Validation(msg)) => {
            let body = form.render("Nueva receta", "/admin/recipes/new", Some(&msg));
            Ok(form_page(&admin, "Nueva receta", body, StatusCode::BAD_REQUEST))
        }
        Err(err) => Err(err.into()),
    }
}

fn image_section(recipe: &Recipe) -> String {
    let id = res::escape(&recipe.id);
    let current = match &recipe.image {
        Some(image) => format!(r#"<img class="recipe-image" src="{}" alt="">"#, res::escape(&image.url)),
        None => r#"<p class="empty">Sin imagen</p>"#.to_owned(),
    };
    format!(
        r#"<section class="card"><h3>Imagen</h3>{current}<form method="post" action="/admin/recipes/{id}/image" enctype="multipart/form-data"><input type="file" name="image" accept="image/*" required><button>Subir imagen</button></form></section>"#
    )
}

fn edit_body(recipe: &Recipe, form: &RecipeForm, error: Option<&str>) -> String {
    let action = format!("/admin/recipes/{}/edit", recipe.id);
    form.render("Editar receta", &action, error) + &image_section(recipe)
}

#[debug_handler(state = AppState)]
pub(super) async fn edit_page(
    admin: AdminUser,
    State(db_pool): State<SqlitePool>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let Some(recipe) = store::get(&db_pool, &id).await? else {
        return Ok(res::sorry("receta"));
    };
    let body = edit_body(&recipe, &RecipeForm::from_recipe(&recipe), None);
    Ok(form_page(&admin, "Editar receta", body, StatusCode::OK))
}

#[debug_handler(state = AppState)]
pub(super) async fn update(
    admin: AdminUser,
    State(db_pool): State<SqlitePool>,
    Path(id): Path<String>,
    Form(form): Form<RecipeForm>,
) -> AppResult<Response> {
    let Some(recipe) = store::get(&db_pool, &id).await? else {
        return Ok(res::sorry("receta"));
    };

    match form.clone().into_draft() {
        Ok(draft) => {
            store::update(&db_pool, &id, &draft).await?;
            info!("u/{} updated recipe {id}", admin.0.id);
            Ok(Redirect::to("/admin/recipes").into_response())
        }
        Err(Error::Validation(msg)) => {
            let body = edit_body(&recipe, &form, Some(&msg));
            Ok(form_page(&admin, "Editar receta", body, StatusCode::BAD_REQUEST))
        }
        Err(err) => Err(err.into()),
    }
}

#[debug_handler(state = AppState)]
pub(super) async fn delete(
    admin: AdminUser,
    State(db_pool): State<SqlitePool>,
    State(storage): State<Storage>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    store::delete(&db_pool, &*storage, &id).await?;
    info!("u/{} deleted recipe {id}", admin.0.id);
    Ok(Redirect::to("/admin/recipes").into_response())
}

#[debug_handler(state = AppState)]
pub(super) async fn upload_image(
    admin: AdminUser,
    State(db_pool): State<SqlitePool>,
    State(storage): State<Storage>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let Some(recipe) = store::get(&db_pool, &id).await? else {
        return Ok(res::sorry("receta"));
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await?;

        return match storage::check_image(content_type.as_deref(), bytes.len()) {
            Ok(ext) => {
                store::replace_image(&db_pool, &*storage, &id, ext, bytes.to_vec()).await?;
                info!("u/{} replaced image of recipe {id}", admin.0.id);
                Ok(Redirect::to(&format!("/admin/recipes/{id}/edit")).into_response())
            }
            Err(Error::Validation(msg)) => {
                let body = edit_body(&recipe, &RecipeForm::from_recipe(&recipe), Some(&msg));
                Ok(form_page(&admin, "Editar receta", body, StatusCode::BAD_REQUEST))
            }
            Err(err) => Err(err.into()),
        };
    }
    Err(Error::validation("Por favor selecciona un archivo de imagen válido").into())
}
