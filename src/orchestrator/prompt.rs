//! Request composition for one item.

use super::ItemRequest;
use crate::diversity::DiversitySelection;
use crate::provider::ChatMessage;

/// Liked and disliked foods named in a prompt, per list.
pub const MAX_PREFERENCES: usize = 2;

/// Carbohydrates named in the "use a different carb" line.
pub const MAX_CARBS: usize = 2;

const SYSTEM_PROMPT: &str = "You are a creative home-cooking recipe writer. \
Respond with exactly one JSON object and nothing else, using the keys: \
name, prep_time, cook_time, servings, difficulty, cuisine, \
ingredients (array of {item, quantity, unit}) and instructions (array of strings).";

pub fn build_messages(
    request: &ItemRequest<'_>,
    tags: &DiversitySelection,
    used_carbs: &[String],
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_prompt(request, tags, used_carbs)),
    ]
}

fn user_prompt(request: &ItemRequest<'_>, tags: &DiversitySelection, used_carbs: &[String]) -> String {
    let mut lines = vec![format!(
        "Create recipe {} of {} for {} servings.",
        request.position, request.total, request.serving_size
    )];

    lines.push("Mandatory constraints:".to_string());
    lines.push(format!("- Cooking technique: {}", tags.technique));
    lines.push(format!("- Flavor base: {}", tags.flavor_base));
    lines.push(format!("- Sauce base: {}", tags.sauce_base));
    lines.push(format!("- Cuisine inspiration: {}", tags.origin));

    if let Some(ingredient) = request.must_include {
        lines.push(format!("- The recipe MUST include: {}", ingredient));
    }

    let preferences = request.preferences;
    if !preferences.liked_foods.is_empty() {
        lines.push(format!(
            "- The household enjoys: {}",
            truncated(&preferences.liked_foods, MAX_PREFERENCES)
        ));
    }
    if !preferences.disliked_foods.is_empty() {
        lines.push(format!(
            "- Avoid: {}",
            truncated(&preferences.disliked_foods, MAX_PREFERENCES)
        ));
    }
    if !preferences.dietary_restrictions.is_empty() {
        lines.push(format!(
            "- Dietary restrictions: {}",
            preferences.dietary_restrictions.join(", ")
        ));
    }
    if !used_carbs.is_empty() {
        lines.push(format!(
            "- Use a different carb than: {}",
            truncated(used_carbs, MAX_CARBS)
        ));
    }

    lines.join("\n")
}

fn truncated(values: &[String], limit: usize) -> String {
    values
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
