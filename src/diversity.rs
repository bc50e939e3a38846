//! Diversity constraint engine.
//!
//! Each item is generated under a four-axis tag tuple. Within a batch, options
//! used by the last K selections are excluded per axis; options seen in the
//! owner's recent history are avoided when that still leaves a choice. An
//! exhausted pool falls back to the full set, so selection never blocks.

use crate::config::DiversityConfig;
use crate::history::{fingerprint, HistoryRecord};
use crate::recipe::Recipe;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const TECHNIQUES: &[&str] = &[
    "slow-braised in aromatic liquids",
    "high-heat seared and roasted",
    "marinated and grilled with char marks",
    "poached gently in flavored broths",
    "smoked low and slow",
    "pan-fried with crispy coating",
    "steamed with aromatic herbs",
    "confit in flavored oils",
    "blackened with spice crusts",
    "sous-vide with precise temperature control",
];

pub const FLAVOR_BASES: &[&str] = &[
    "Mediterranean herbs",
    "Middle Eastern spices",
    "Asian five-spice",
    "Indian curry spices",
    "Mexican heat and smokiness",
    "North African warmth",
    "French herbes de Provence",
    "Caribbean jerk seasonings",
    "Scandinavian dill and juniper",
    "Peruvian aji peppers",
];

pub const SAUCE_BASES: &[&str] = &[
    "tomato-based sauces",
    "cream or coconut milk bases",
    "citrus and herb marinades",
    "fermented bean pastes",
    "wine and stock reductions",
    "nut-based sauces and pestos",
    "vinegar-based pickled elements",
    "fruit-based chutneys and salsas",
    "yogurt and herb cooling sauces",
    "oil-based infusions",
];

pub const ORIGINS: &[&str] = &[
    "Japanese",
    "Italian",
    "Indian",
    "Mexican",
    "French",
    "Thai",
    "Middle Eastern",
    "Korean",
    "Peruvian",
    "Vietnamese",
];

/// Carbohydrate keywords; multi-word entries come before their suffixes.
const CARB_KEYWORDS: &[&str] = &[
    "sweet potato",
    "rice",
    "pasta",
    "noodle",
    "potato",
    "quinoa",
    "bulgur",
    "couscous",
    "polenta",
    "bread",
    "barley",
    "lentil",
    "chickpea",
    "bean",
    "flour",
    "wheat",
    "oat",
    "corn",
    "maize",
];

const NAME_STOPWORDS: &[&str] = &["the", "and", "with", "for", "recipe", "style"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiversitySelection {
    pub technique: String,
    pub flavor_base: String,
    pub sauce_base: String,
    pub origin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Technique,
    FlavorBase,
    SauceBase,
    Origin,
}

impl Axis {
    pub const ALL: [Axis; 4] = [
        Axis::Technique,
        Axis::FlavorBase,
        Axis::SauceBase,
        Axis::Origin,
    ];

    pub fn options(self) -> &'static [&'static str] {
        match self {
            Axis::Technique => TECHNIQUES,
            Axis::FlavorBase => FLAVOR_BASES,
            Axis::SauceBase => SAUCE_BASES,
            Axis::Origin => ORIGINS,
        }
    }

    fn value(self, selection: &DiversitySelection) -> &str {
        match self {
            Axis::Technique => &selection.technique,
            Axis::FlavorBase => &selection.flavor_base,
            Axis::SauceBase => &selection.sauce_base,
            Axis::Origin => &selection.origin,
        }
    }

    /// Size of the smallest axis pool.
    pub fn min_pool() -> usize {
        Self::ALL.iter().map(|a| a.options().len()).min().unwrap_or(0)
    }
}

/// Per-job diversity state: the accepted selections and carbohydrates so far.
///
/// Owned by exactly one job and threaded through each item in order.
#[derive(Debug, Clone, Default)]
pub struct DiversityState {
    window: usize,
    used: Vec<DiversitySelection>,
    used_carbs: Vec<String>,
}

impl DiversityState {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    /// State for a batch of `requested` items: the exclusion window widens to
    /// the whole batch when every item can get its own option on each axis.
    pub fn for_batch(requested: usize, config: &DiversityConfig) -> Self {
        let window = if config.widen_when_batch_fits && requested <= Axis::min_pool() {
            config.exclusion_window.max(requested)
        } else {
            config.exclusion_window
        };
        Self::new(window)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn used(&self) -> &[DiversitySelection] {
        &self.used
    }

    pub fn used_carbs(&self) -> &[String] {
        &self.used_carbs
    }

    pub fn record(&mut self, selection: DiversitySelection, recipe: &Recipe) {
        self.used.push(selection);
        for carb in detect_carbs(recipe) {
            if !self.used_carbs.contains(&carb) {
                self.used_carbs.push(carb);
            }
        }
    }
}

/// Why an item was flagged as similar to history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collision {
    Fingerprint { name: String },
    SharedNameWords { name: String, words: Vec<String> },
    TechniqueFlavor { name: String },
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collision::Fingerprint { name } => write!(f, "same signature as '{}'", name),
            Collision::SharedNameWords { name, words } => {
                write!(f, "name shares '{}' with '{}'", words.join("', '"), name)
            }
            Collision::TechniqueFlavor { name } => {
                write!(f, "same technique and flavor base as '{}'", name)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiversityEngine {
    config: DiversityConfig,
}

impl DiversityEngine {
    pub fn new(config: DiversityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiversityConfig {
        &self.config
    }

    pub fn select(&self, state: &DiversityState, history: &[HistoryRecord]) -> DiversitySelection {
        self.select_with(state, history, &mut rand::thread_rng())
    }

    /// `history` is most-recent first, as returned by the history store.
    pub fn select_with<R: Rng + ?Sized>(
        &self,
        state: &DiversityState,
        history: &[HistoryRecord],
        rng: &mut R,
    ) -> DiversitySelection {
        let mut pick = |axis: Axis| -> String {
            let pool = axis.options();
            let recent_batch: HashSet<&str> = state
                .used
                .iter()
                .rev()
                .take(state.window)
                .map(|s| axis.value(s))
                .collect();
            let mut candidates: Vec<&str> = pool
                .iter()
                .copied()
                .filter(|o| !recent_batch.contains(o))
                .collect();
            if candidates.is_empty() {
                candidates = pool.to_vec();
            }

            if self.config.avoid_history {
                let recent_history: HashSet<&str> = history
                    .iter()
                    .take(self.config.exclusion_window)
                    .map(|r| axis.value(&r.tags))
                    .collect();
                let fresh: Vec<&str> = candidates
                    .iter()
                    .copied()
                    .filter(|o| !recent_history.contains(o))
                    .collect();
                if !fresh.is_empty() {
                    candidates = fresh;
                }
            }

            candidates
                .choose(rng)
                .or_else(|| pool.first())
                .map(|s| s.to_string())
                .unwrap_or_default()
        };

        DiversitySelection {
            technique: pick(Axis::Technique),
            flavor_base: pick(Axis::FlavorBase),
            sauce_base: pick(Axis::SauceBase),
            origin: pick(Axis::Origin),
        }
    }

    /// Check an item against history; the first matching rule wins.
    pub fn verify(
        &self,
        recipe: &Recipe,
        tags: &DiversitySelection,
        history: &[HistoryRecord],
    ) -> Option<Collision> {
        let print = fingerprint(recipe, tags);
        let words = significant_words(&recipe.name);

        for record in history {
            if record.fingerprint == print {
                return Some(Collision::Fingerprint {
                    name: record.name.clone(),
                });
            }
            let shared: Vec<String> = significant_words(&record.name)
                .into_iter()
                .filter(|w| words.contains(w))
                .collect();
            if shared.len() >= 2 {
                return Some(Collision::SharedNameWords {
                    name: record.name.clone(),
                    words: shared,
                });
            }
            if record.tags.technique == tags.technique && record.tags.flavor_base == tags.flavor_base
            {
                return Some(Collision::TechniqueFlavor {
                    name: record.name.clone(),
                });
            }
        }
        None
    }
}

fn significant_words(name: &str) -> Vec<String> {
    let mut words: Vec<String> = name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !NAME_STOPWORDS.contains(w))
        .map(str::to_string)
        .collect();
    words.sort();
    words.dedup();
    words
}

/// Carbohydrate keywords appearing in a recipe's component items.
pub fn detect_carbs(recipe: &Recipe) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for ingredient in &recipe.ingredients {
        let item = ingredient.item.to_lowercase();
        if let Some(carb) = CARB_KEYWORDS.iter().find(|k| item.contains(*k)) {
            if !found.iter().any(|f| f == carb) {
                found.push(carb.to_string());
            }
        }
    }
    found
}
