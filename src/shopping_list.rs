//! Consolidated shopping list over a batch of recipes.

use crate::recipe::Recipe;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub item: String,
    /// Rendered amounts, e.g. "700 g" or "2 cups, 1 pinch".
    pub quantity: String,
}

#[derive(Debug)]
struct Amount {
    value: Option<f64>,
    raw: String,
    unit: String,
}

impl Amount {
    fn render(&self) -> String {
        let quantity = match self.value {
            Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
            Some(v) => format!("{:.2}", v)
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string(),
            None => self.raw.clone(),
        };
        [quantity.as_str(), self.unit.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Aggregate components by lowercased item, in first-seen order. Numeric
/// quantities with the same unit are summed; anything else is listed alongside.
pub fn consolidate(recipes: &[Recipe]) -> Vec<ShoppingItem> {
    let mut entries: Vec<(String, Vec<Amount>)> = Vec::new();

    for ingredient in recipes.iter().flat_map(|r| r.ingredients.iter()) {
        let key = ingredient.item.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        let unit = ingredient.unit.trim().to_lowercase();
        let raw = ingredient.quantity.trim().to_string();
        let value = raw.parse::<f64>().ok();

        let index = match entries.iter().position(|(item, _)| *item == key) {
            Some(index) => index,
            None => {
                entries.push((key, Vec::new()));
                entries.len() - 1
            }
        };
        let amounts = &mut entries[index].1;

        let mergeable = amounts
            .iter_mut()
            .find(|a| a.unit == unit && a.value.is_some() && value.is_some());
        match (mergeable, value) {
            (Some(existing), Some(v)) => {
                existing.value = existing.value.map(|e| e + v);
            }
            _ => {
                if raw.is_empty() && unit.is_empty() && !amounts.is_empty() {
                    continue;
                }
                amounts.push(Amount { value, raw, unit });
            }
        }
    }

    entries
        .into_iter()
        .map(|(item, amounts)| ShoppingItem {
            item,
            quantity: amounts
                .iter()
                .map(Amount::render)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect()
}
