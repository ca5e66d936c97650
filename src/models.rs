//! Core data models used throughout the pipeline.
//!
//! Two families of types live here: the scoring enums and tri-state flag
//! shared by every stage, and the plain structures that flow between the
//! transformer and the loader ([`NormalizedRecord`] and its parts). The
//! persisted reference entities ([`Brand`], [`Nutrient`], ...) are what the
//! resolver hands back.

use serde::Serialize;
use std::fmt;

/// Nutri-Score / Eco-Score grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    Unknown,
}

impl Grade {
    /// Parse an upstream grade such as `"a"` or `"E"`. Returns `None` for
    /// anything outside `a`–`e`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a" => Some(Grade::A),
            "b" => Some(Grade::B),
            "c" => Some(Grade::C),
            "d" => Some(Grade::D),
            "e" => Some(Grade::E),
            _ => None,
        }
    }

    /// Column value; `None` is stored as SQL `NULL`.
    pub fn as_db(self) -> Option<&'static str> {
        match self {
            Grade::A => Some("a"),
            Grade::B => Some("b"),
            Grade::C => Some("c"),
            Grade::D => Some("d"),
            Grade::E => Some("e"),
            Grade::Unknown => None,
        }
    }

    pub fn from_db(value: Option<&str>) -> Self {
        value.and_then(Grade::parse).unwrap_or(Grade::Unknown)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_db() {
            Some(letter) => write!(f, "{}", letter.to_ascii_uppercase()),
            None => write!(f, "unknown"),
        }
    }
}

/// NOVA food-processing classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NovaGroup {
    #[serde(rename = "1")]
    Unprocessed,
    #[serde(rename = "2")]
    ProcessedIngredients,
    #[serde(rename = "3")]
    Processed,
    #[serde(rename = "4")]
    UltraProcessed,
    Unknown,
}

impl NovaGroup {
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(NovaGroup::Unprocessed),
            2 => Some(NovaGroup::ProcessedIngredients),
            3 => Some(NovaGroup::Processed),
            4 => Some(NovaGroup::UltraProcessed),
            _ => None,
        }
    }

    pub fn as_db(self) -> Option<i64> {
        match self {
            NovaGroup::Unprocessed => Some(1),
            NovaGroup::ProcessedIngredients => Some(2),
            NovaGroup::Processed => Some(3),
            NovaGroup::UltraProcessed => Some(4),
            NovaGroup::Unknown => None,
        }
    }

    pub fn from_db(value: Option<i64>) -> Self {
        value
            .and_then(NovaGroup::from_number)
            .unwrap_or(NovaGroup::Unknown)
    }
}

impl fmt::Display for NovaGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_db() {
            Some(n) => write!(f, "{}", n),
            None => write!(f, "unknown"),
        }
    }
}

/// Kind of a product tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Allergen,
    Additive,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TagKind::Allergen => "allergen",
            TagKind::Additive => "additive",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "allergen" => Some(TagKind::Allergen),
            "additive" => Some(TagKind::Additive),
            _ => None,
        }
    }
}

/// Three-valued flag: known true, known false, or not known.
///
/// Kept distinct from `bool` so an unknown incoming value can never
/// overwrite a known stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    True,
    False,
    #[default]
    Unknown,
}

impl TriState {
    /// Parse the upstream vocabulary: `yes`/`en:yes`/`true`,
    /// `no`/`en:no`/`false`. Everything else, `maybe` included, is unknown.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" | "en:yes" | "true" => TriState::True,
            "no" | "en:no" | "false" => TriState::False,
            _ => TriState::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != TriState::Unknown
    }

    pub fn as_db(self) -> Option<bool> {
        match self {
            TriState::True => Some(true),
            TriState::False => Some(false),
            TriState::Unknown => None,
        }
    }

    pub fn from_db(value: Option<bool>) -> Self {
        match value {
            Some(true) => TriState::True,
            Some(false) => TriState::False,
            None => TriState::Unknown,
        }
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriState::True => "yes",
            TriState::False => "no",
            TriState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Mutable product attributes, keyed by `code`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductAttributes {
    pub code: String,
    pub name: Option<String>,
    pub nutriscore: Grade,
    pub ecoscore: Grade,
    pub nova_group: NovaGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSpec {
    pub name: String,
    pub kind: TagKind,
}

/// One nutrient value per 100 g.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutrientFact {
    pub name: String,
    pub unit: String,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientEntry {
    pub name: String,
    pub vegan: TriState,
    pub vegetarian: TriState,
    pub quantity: Option<f64>,
}

/// Output of the transformer and input of the loader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub product: ProductAttributes,
    pub brand: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<TagSpec>,
    pub nutrients: Vec<NutrientFact>,
    pub ingredients: Vec<IngredientEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brand {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub kind: TagKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nutrient {
    pub id: i64,
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub vegan: TriState,
    pub vegetarian: TriState,
}
