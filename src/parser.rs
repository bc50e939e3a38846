//! Staged recipe parser.
//!
//! Turns whatever text the provider returned into a [`ParseOutcome`]. The parser
//! never fails: it tries a strict parse, then a cleaned parse, then per-field
//! extraction, and finally reports the text as unparseable.

use crate::recipe::{Ingredient, ItemOrigin, Recipe};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const RAW_EXCERPT_CHARS: usize = 500;

const DEFAULT_PREP_TIME: &str = "20 minutes";
const DEFAULT_COOK_TIME: &str = "30 minutes";
const DEFAULT_DIFFICULTY: &str = "Medium";

/// Per-item context used to fill defaults.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    /// 1-based position of the item in its batch.
    pub item_number: usize,
    pub serving_size: u32,
}

/// Result of parsing one provider response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    WellFormed(Recipe),
    Degraded { recipe: Recipe, reason: String },
    Unparseable { raw: String },
}

impl ParseOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ParseOutcome::WellFormed(_) => "well_formed",
            ParseOutcome::Degraded { .. } => "degraded",
            ParseOutcome::Unparseable { .. } => "unparseable",
        }
    }

    pub fn recipe(&self) -> Option<&Recipe> {
        match self {
            ParseOutcome::WellFormed(recipe) | ParseOutcome::Degraded { recipe, .. } => Some(recipe),
            ParseOutcome::Unparseable { .. } => None,
        }
    }
}

/// Parse a provider response. Total and deterministic for a given input and context.
pub fn parse_recipe(raw: &str, ctx: ParseContext) -> ParseOutcome {
    if let Some(recipe) = strict_parse(raw, ctx) {
        return ParseOutcome::WellFormed(recipe);
    }

    let cleaned = clean_response(raw);
    if let Some(recipe) = strict_parse(&cleaned, ctx) {
        debug!(item = ctx.item_number, "Recovered recipe after cleaning response");
        return ParseOutcome::WellFormed(recipe);
    }

    if let Some((recipe, reason)) = extract_fields(&normalize_punctuation(raw), ctx) {
        debug!(item = ctx.item_number, reason = %reason, "Recovered recipe by field extraction");
        return ParseOutcome::Degraded { recipe, reason };
    }

    ParseOutcome::Unparseable {
        raw: excerpt(raw),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Number(number) => number.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireIngredient {
    Structured {
        item: String,
        #[serde(default)]
        quantity: Option<Scalar>,
        #[serde(default)]
        unit: Option<String>,
    },
    Line(String),
}

#[derive(Deserialize)]
struct WireRecipe {
    name: String,
    #[serde(default)]
    prep_time: Option<Scalar>,
    #[serde(default)]
    cook_time: Option<Scalar>,
    #[serde(default)]
    servings: Option<Scalar>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    cuisine: Option<String>,
    #[serde(default)]
    cuisine_inspiration: Option<String>,
    #[serde(default)]
    ingredients: Vec<WireIngredient>,
    #[serde(default)]
    instructions: Vec<Scalar>,
}

fn strict_parse(text: &str, ctx: ParseContext) -> Option<Recipe> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let record = match value {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    let wire: WireRecipe = serde_json::from_value(record).ok()?;
    into_recipe(wire, ctx)
}

fn into_recipe(wire: WireRecipe, ctx: ParseContext) -> Option<Recipe> {
    let name = wire.name.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let ingredients: Vec<Ingredient> = wire
        .ingredients
        .into_iter()
        .filter_map(|ingredient| match ingredient {
            WireIngredient::Structured {
                item,
                quantity,
                unit,
            } => Some(Ingredient::new(
                item.trim(),
                quantity.map(Scalar::into_text).unwrap_or_default(),
                unit.unwrap_or_default(),
            )),
            WireIngredient::Line(line) => {
                let line = line.trim();
                (!line.is_empty()).then(|| Ingredient::new(line, "", ""))
            }
        })
        .filter(|ingredient| !ingredient.item.is_empty())
        .collect();

    let instructions: Vec<String> = wire
        .instructions
        .into_iter()
        .map(Scalar::into_text)
        .map(|step| step.trim().to_string())
        .filter(|step| !step.is_empty())
        .collect();

    if ingredients.is_empty() || instructions.is_empty() {
        return None;
    }

    Some(Recipe {
        name,
        prep_time: text_or(wire.prep_time, DEFAULT_PREP_TIME),
        cook_time: text_or(wire.cook_time, DEFAULT_COOK_TIME),
        servings: wire
            .servings
            .and_then(|s| leading_number(&s.into_text()))
            .unwrap_or(ctx.serving_size),
        difficulty: wire
            .difficulty
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
        cuisine: wire.cuisine_inspiration.or(wire.cuisine),
        ingredients,
        instructions,
        tags: None,
        origin: ItemOrigin::Generated,
        similarity_warning: None,
        media_ref: None,
    })
}

fn text_or(value: Option<Scalar>, default: &str) -> String {
    value
        .map(Scalar::into_text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|n| *n > 0)
}

static FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*```[A-Za-z]*\s*$").expect("static pattern"));
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("static pattern"));

/// Strip prose and code fences, trim to the outermost braces, fix common JSON slips.
pub fn clean_response(raw: &str) -> String {
    let normalized = normalize_punctuation(raw.trim());
    let unfenced = FENCE_LINE.replace_all(&normalized, "");
    let unfenced = unfenced.replace("```json", "").replace("```", "");

    let trimmed = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced.as_str(),
    };

    let unescaped = trimmed.replace("\\'", "'");
    TRAILING_COMMA.replace_all(&unescaped, "$1").into_owned()
}

fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{00A0}' => ' ',
            other => other,
        })
        .collect()
}

static NAME_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""name"\s*:\s*"([^"]+)""#).expect("static pattern"));
static PREP_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""prep_time"\s*:\s*"([^"]+)""#).expect("static pattern"));
static COOK_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""cook_time"\s*:\s*"([^"]+)""#).expect("static pattern"));
static STYLE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:cuisine_inspiration|cuisine|style)"\s*:\s*"([^"]+)""#).expect("static pattern")
});
static DIFFICULTY_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""difficulty"\s*:\s*"([^"]+)""#).expect("static pattern"));

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Per-field recovery. Returns `None` when not a single field can be found.
fn extract_fields(text: &str, ctx: ParseContext) -> Option<(Recipe, String)> {
    let name = capture(&NAME_FIELD, text);
    let prep_time = capture(&PREP_FIELD, text);
    let cook_time = capture(&COOK_FIELD, text);
    let cuisine = capture(&STYLE_FIELD, text);
    let difficulty = capture(&DIFFICULTY_FIELD, text);

    let found: Vec<&str> = [
        ("name", name.is_some()),
        ("prep_time", prep_time.is_some()),
        ("cook_time", cook_time.is_some()),
        ("style", cuisine.is_some()),
        ("difficulty", difficulty.is_some()),
    ]
    .iter()
    .filter(|(_, present)| *present)
    .map(|(field, _)| *field)
    .collect();

    if found.is_empty() {
        return None;
    }

    let reason = format!("field extraction recovered {}", found.join(", "));
    let recipe = Recipe {
        name: name.unwrap_or_else(|| format!("Recipe {}", ctx.item_number)),
        prep_time: prep_time.unwrap_or_else(|| DEFAULT_PREP_TIME.to_string()),
        cook_time: cook_time.unwrap_or_else(|| DEFAULT_COOK_TIME.to_string()),
        servings: ctx.serving_size,
        difficulty: difficulty.unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
        cuisine,
        ingredients: vec![
            Ingredient::new("main ingredient", "500", "g"),
            Ingredient::new("vegetables", "200", "g"),
            Ingredient::new("seasoning", "5", "ml"),
        ],
        instructions: vec![
            "Prepare ingredients".to_string(),
            "Cook main ingredient".to_string(),
            "Add vegetables and seasonings".to_string(),
            "Serve hot".to_string(),
        ],
        tags: None,
        origin: ItemOrigin::Degraded {
            reason: reason.clone(),
        },
        similarity_warning: None,
        media_ref: None,
    };
    Some((recipe, reason))
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(RAW_EXCERPT_CHARS).collect()
}
