//! Offline item synthesis. Deterministic for a given request, tag tuple and reason.

use super::ItemRequest;
use crate::diversity::DiversitySelection;
use crate::recipe::{Ingredient, ItemOrigin, Recipe};

pub fn fallback_recipe(
    request: &ItemRequest<'_>,
    tags: &DiversitySelection,
    reason: impl Into<String>,
) -> Recipe {
    let technique = title_word(tags.technique.split_whitespace().next().unwrap_or("Home"));
    let name = match request.must_include {
        Some(ingredient) => format!("{} {} {}", tags.origin, technique, title_phrase(ingredient)),
        None => format!("{} {} Recipe {}", tags.origin, technique, request.position),
    };

    let mut ingredients = Vec::with_capacity(4);
    if let Some(ingredient) = request.must_include {
        ingredients.push(Ingredient::new(ingredient, "200", "g"));
    }
    ingredients.push(Ingredient::new("main protein", "400", "g"));
    ingredients.push(Ingredient::new("seasonal vegetables", "300", "g"));
    ingredients.push(Ingredient::new(
        format!("{} seasoning", tags.flavor_base.to_lowercase()),
        "5",
        "ml",
    ));

    Recipe {
        name,
        prep_time: "20 minutes".to_string(),
        cook_time: "30 minutes".to_string(),
        servings: request.serving_size,
        difficulty: "Medium".to_string(),
        cuisine: Some(tags.origin.clone()),
        ingredients,
        instructions: vec![
            "Prepare the main protein and cut the vegetables into even pieces.".to_string(),
            format!("Season everything with {}.", tags.flavor_base.to_lowercase()),
            format!("Cook the protein: {}.", tags.technique),
            format!("Finish with {}.", tags.sauce_base),
            "Adjust the seasoning and serve.".to_string(),
        ],
        tags: Some(tags.clone()),
        origin: ItemOrigin::Fallback {
            reason: reason.into(),
        },
        similarity_warning: None,
        media_ref: None,
    }
}

fn title_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn title_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(title_word)
        .collect::<Vec<_>>()
        .join(" ")
}
