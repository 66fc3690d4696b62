use serde::{Deserialize, Serialize};
use sqlx::{types::Json, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::{db, storage::{ObjectStore, StoredObject}, Error};

text_enum! {
    pub enum Difficulty {
        Beginner => "beginner", "NIVEL PRINCIPIANTE";
        Familiarized => "familiarized", "NIVEL FAMILIARIZADO";
        Challenge => "challenge", "RETO";
    }
}

text_enum! {
    pub enum RecipeType {
        Salty => "salty", "SALADO";
        Sweet => "sweet", "DULCE";
        Snack => "snack", "SNACK";
        Healthy => "healthy", "SALUDABLE";
    }
}

impl Difficulty {
    pub fn color(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "#4CAF50",
            Difficulty::Familiarized => "#FF9800",
            Difficulty::Challenge => "#F44336",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub ingredients: Vec<String>,
    pub difficulty: Difficulty,
    #[serde(rename = "type")]
    pub recipe_type: RecipeType,
    pub steps_adults: Vec<String>,
    pub steps_children: Vec<String>,
    pub image: Option<StoredObject>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Everything an admin edits; the image is managed separately.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub title: String,
    pub ingredients: Vec<String>,
    pub difficulty: Difficulty,
    pub recipe_type: RecipeType,
    pub steps_adults: Vec<String>,
    pub steps_children: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RecipeFilter {
    #[serde(rename = "type")]
    pub recipe_type: Option<RecipeType>,
    pub difficulty: Option<Difficulty>,
}

#[derive(sqlx::FromRow)]
struct RecipeRow {
    id: String,
    title: String,
    ingredients: Json<Vec<String>>,
    difficulty: String,
    recipe_type: String,
    steps_adults: Json<Vec<String>>,
    steps_children: Json<Vec<String>>,
    image_url: Option<String>,
    image_path: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<RecipeRow> for Recipe {
    type Error = Error;

    fn try_from(row: RecipeRow) -> crate::Result<Self> {
        Ok(Recipe {
            id: row.id,
            title: row.title,
            ingredients: row.ingredients.0,
            difficulty: row.difficulty.parse()?,
            recipe_type: row.recipe_type.parse()?,
            steps_adults: row.steps_adults.0,
            steps_children: row.steps_children.0,
            image: row.image_url.zip(row.image_path).map(|(url, path)| StoredObject { url, path }),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id,title,ingredients,difficulty,recipe_type,steps_adults,steps_children,image_url,image_path,created_at,updated_at";

pub async fn create(db_pool: &SqlitePool, draft: &RecipeDraft) -> crate::Result<Recipe> {
    let id = Uuid::now_v7().to_string();
    let now = db::now_millis();

    sqlx::query(&format!("INSERT INTO recipes ({COLUMNS}) VALUES (?,?,?,?,?,?,?,NULL,NULL,?,?)"))
        .bind(&id)
        .bind(&draft.title)
        .bind(Json(&draft.ingredients))
        .bind(draft.difficulty.as_str())
        .bind(draft.recipe_type.as_str())
        .bind(Json(&draft.steps_adults))
        .bind(Json(&draft.steps_children))
        .bind(now)
        .bind(now)
        .execute(db_pool)
        .await?;

    info!("created recipe {id} `{}`", draft.title);
    get(db_pool, &id).await?.ok_or_else(|| Error::not_found("recipe"))
}

pub async fn get(db_pool: &SqlitePool, id: &str) -> crate::Result<Option<Recipe>> {
    sqlx::query_as::<_, RecipeRow>(&format!("SELECT {COLUMNS} FROM recipes WHERE id=?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .map(Recipe::try_from)
        .transpose()
}

/// Equality filters on type and difficulty, newest first.
pub async fn list(db_pool: &SqlitePool, filter: RecipeFilter) -> crate::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, RecipeRow>(&format!(
        "SELECT {COLUMNS} FROM recipes \
         WHERE (?1 IS NULL OR recipe_type=?1) AND (?2 IS NULL OR difficulty=?2) \
         ORDER BY created_at DESC, id DESC"
    ))
        .bind(filter.recipe_type.map(|t| t.as_str()))
        .bind(filter.difficulty.map(|d| d.as_str()))
        .fetch_all(db_pool)
        .await?;

    rows.into_iter().map(Recipe::try_from).collect()
}

/// Case-insensitive title substring search.
pub async fn search(db_pool: &SqlitePool, query: &str) -> crate::Result<Vec<Recipe>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    // SQLite's lower() only folds ASCII, so accents are matched here
    Ok(list(db_pool, RecipeFilter::default())
        .await?
        .into_iter()
        .filter(|r| r.title.to_lowercase().contains(&needle))
        .collect())
}

pub async fn update(db_pool: &SqlitePool, id: &str, draft: &RecipeDraft) -> crate::Result<Recipe> {
    let updated = sqlx::query(
        "UPDATE recipes SET title=?, ingredients=?, difficulty=?, recipe_type=?, steps_adults=?, steps_children=?, updated_at=? WHERE id=?"
    )
        .bind(&draft.title)
        .bind(Json(&draft.ingredients))
        .bind(draft.difficulty.as_str())
        .bind(draft.recipe_type.as_str())
        .bind(Json(&draft.steps_adults))
        .bind(Json(&draft.steps_children))
        .bind(db::now_millis())
        .bind(id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(Error::not_found("recipe"));
    }

    info!("updated recipe {id}");
    get(db_pool, id).await?.ok_or_else(|| Error::not_found("recipe"))
}

/// Stores a new image for the recipe and removes the one it replaces.
pub async fn replace_image(
    db_pool: &SqlitePool,
    storage: &dyn ObjectStore,
    id: &str,
    ext: &str,
    bytes: Vec<u8>,
) -> crate::Result<Recipe> {
    let recipe = get(db_pool, id).await?.ok_or_else(|| Error::not_found("recipe"))?;

    let stored = storage.put(&format!("recipes/{id}/{}.{ext}", Uuid::now_v7().simple()), bytes).await?;
    sqlx::query("UPDATE recipes SET image_url=?, image_path=?, updated_at=? WHERE id=?")
        .bind(&stored.url)
        .bind(&stored.path)
        .bind(db::now_millis())
        .bind(id)
        .execute(db_pool)
        .await?;

    if let Some(old) = recipe.image {
        storage.delete(&old.path).await?;
    }
    get(db_pool, id).await?.ok_or_else(|| Error::not_found("recipe"))
}

/// Deletes the recipe row and, when it has one, its stored image.
pub async fn delete(db_pool: &SqlitePool, storage: &dyn ObjectStore, id: &str) -> crate::Result<Recipe> {
    let recipe = get(db_pool, id).await?.ok_or_else(|| Error::not_found("recipe"))?;

    sqlx::query("DELETE FROM recipes WHERE id=?")
        .bind(id)
        .execute(db_pool)
        .await?;

    if let Some(image) = &recipe.image {
        storage.delete(&image.path).await?;
    }

    info!("deleted recipe {id} `{}`", recipe.title);
    Ok(recipe)
}
