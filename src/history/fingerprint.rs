//! Fingerprints: a compact key over an item's categorical tags and main
//! ingredients, used for cross-batch de-duplication.

use crate::diversity::DiversitySelection;
use crate::recipe::Recipe;

use super::MAIN_INGREDIENT_COUNT;

/// The human-readable signature the fingerprint is hashed from:
/// `technique|flavor|sauce|ingredient-ingredient-ingredient`, lowercased.
pub fn signature(recipe: &Recipe, tags: &DiversitySelection) -> String {
    let first_word = |s: &str| s.split_whitespace().next().unwrap_or("").to_lowercase();
    let ingredients = recipe
        .ingredients
        .iter()
        .take(MAIN_INGREDIENT_COUNT)
        .map(|i| i.item.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("-");
    format!(
        "{}|{}|{}|{}",
        first_word(&tags.technique),
        first_word(&tags.flavor_base),
        first_word(&tags.sauce_base),
        ingredients
    )
}

/// Hex of the first 16 bytes of the BLAKE3 hash of the signature.
pub fn fingerprint(recipe: &Recipe, tags: &DiversitySelection) -> String {
    let hash = blake3::hash(signature(recipe, tags).as_bytes());
    hex::encode(&hash.as_bytes()[..16])
}
