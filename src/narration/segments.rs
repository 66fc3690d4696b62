//! Builds the utterances read out for a recipe.

use super::{Audience, Target};
use crate::recipes::Recipe;

pub const NO_INGREDIENTS: &str = "No hay ingredientes disponibles";
pub const NO_STEPS: &str = "No hay pasos disponibles";

pub fn ingredient_segments(title: &str, ingredients: &[String]) -> Vec<String> {
    if ingredients.is_empty() {
        return vec![NO_INGREDIENTS.to_owned()];
    }
    [title.to_owned(), "Ingredientes:".to_owned()]
        .into_iter()
        .chain(ingredients.iter().cloned())
        .collect()
}

pub fn step_segments(audience: Audience, steps: &[String]) -> Vec<String> {
    if steps.is_empty() {
        return vec![NO_STEPS.to_owned()];
    }
    let lead_in = match audience {
        Audience::Adult => "Pasos para adultos:",
        Audience::Child => "Pasos para niños:",
    };
    std::iter::once(lead_in.to_owned())
        .chain(steps.iter().enumerate().map(|(i, step)| format!("Paso {}: {step}", i + 1)))
        .collect()
}

pub fn for_recipe(recipe: &Recipe, target: Target, audience: Audience) -> Vec<String> {
    match (target, audience) {
        (Target::Ingredients, _) => ingredient_segments(&recipe.title, &recipe.ingredients),
        (Target::Steps, Audience::Adult) => step_segments(audience, &recipe.steps_adults),
        (Target::Steps, Audience::Child) => step_segments(audience, &recipe.steps_children),
    }
}
