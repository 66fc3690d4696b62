//! The admin recipe form: list fields are textareas with one entry per line.

use serde::Deserialize;

use crate::{res, Error};

use super::store::{Difficulty, Recipe, RecipeDraft, RecipeType};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ingredients: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub steps_adults: String,
    #[serde(default)]
    pub steps_children: String,
}

/// Trimmed, non-blank lines in their original order.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

impl RecipeForm {
    pub fn from_recipe(recipe: &Recipe) -> Self {
        RecipeForm {
            title: recipe.title.clone(),
            ingredients: recipe.ingredients.join("\n"),
            difficulty: recipe.difficulty.as_str().to_owned(),
            category: recipe.recipe_type.as_str().to_owned(),
            steps_adults: recipe.steps_adults.join("\n"),
            steps_children: recipe.steps_children.join("\n"),
        }
    }

    /// Title, ingredients, difficulty and category are required; either step
    /// list may be left empty.
    pub fn into_draft(self) -> crate::Result<RecipeDraft> {
        let title = self.title.trim().to_owned();
        let ingredients = split_lines(&self.ingredients);
        if title.is_empty() || ingredients.is_empty() || self.difficulty.is_empty() || self.category.is_empty() {
            return Err(Error::validation("Por favor completa todos los campos"));
        }

        Ok(RecipeDraft {
            title,
            ingredients,
            difficulty: self.difficulty.parse()?,
            recipe_type: self.category.parse()?,
            steps_adults: split_lines(&self.steps_adults),
            steps_children: split_lines(&self.steps_children),
        })
    }

    /// Fills `res/pages/recipe_form.html`.
    pub fn render(&self, heading: &str, action: &str, error: Option<&str>) -> String {
        let options = |all: &[(&str, &str)], selected: &str| -> String {
            all.iter()
                .map(|(value, label)| format!(
                    r#"<option value="{value}"{}>{label}</option>"#,
                    if *value == selected { " selected" } else { "" }
                ))
                .collect()
        };
        let difficulties: Vec<_> = Difficulty::ALL.iter().map(|d| (d.as_str(), d.label())).collect();
        let categories: Vec<_> = RecipeType::ALL.iter().map(|t| (t.as_str(), t.label())).collect();

        crate::include_res!(str, "/pages/recipe_form.html")
            .replace("{heading}", heading)
            .replace("{action}", action)
            .replace("{notice}", &res::notice("error", error))
            .replace("{title}", &res::escape(&self.title))
            .replace("{difficulty_options}", &options(&difficulties, &self.difficulty))
            .replace("{category_options}", &options(&categories, &self.category))
            .replace("{ingredients}", &res::escape(&self.ingredients))
            .replace("{steps_adults}", &res::escape(&self.steps_adults))
            .replace("{steps_children}", &res::escape(&self.steps_children))
    }
}
