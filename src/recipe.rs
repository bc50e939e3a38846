//! Generated item data model.
//!
//! A [`Recipe`] is the structured record produced for every position of a batch,
//! whether it came from a well-formed provider response, a degraded parse, or
//! the offline fallback.

use crate::diversity::DiversitySelection;
use serde::{Deserialize, Serialize};

/// One component line of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub item: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub unit: String,
}

impl Ingredient {
    pub fn new(item: impl Into<String>, quantity: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            quantity: quantity.into(),
            unit: unit.into(),
        }
    }

    /// Human-readable component line, e.g. "600 g chicken thigh".
    pub fn line(&self) -> String {
        [self.quantity.as_str(), self.unit.as_str(), self.item.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where an item's content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemOrigin {
    /// Parsed from a structurally valid provider response.
    Generated,
    /// Recovered by per-field extraction; missing fields carry defaults.
    Degraded { reason: String },
    /// Synthesized locally because the provider was unavailable or unparseable.
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub prep_time: String,
    pub cook_time: String,
    pub servings: u32,
    pub difficulty: String,
    /// Style tag reported by the provider (e.g. "Italian").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    /// Categorical tags the item was generated under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<DiversitySelection>,
    pub origin: ItemOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
}

impl Recipe {
    /// Degraded and fallback items are both reported as "fallback".
    pub fn is_fallback(&self) -> bool {
        !matches!(self.origin, ItemOrigin::Generated)
    }

    pub fn is_flagged(&self) -> bool {
        self.is_fallback() || self.similarity_warning.is_some()
    }

    pub fn component_lines(&self) -> Vec<String> {
        self.ingredients.iter().map(Ingredient::line).collect()
    }

    /// Case-insensitive containment check across component lines.
    pub fn mentions_ingredient(&self, ingredient: &str) -> bool {
        let needle = ingredient.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.component_lines()
            .iter()
            .any(|line| line.to_lowercase().contains(&needle))
    }
}
