//! Label page analysis
//!
//! Everything that looks inside a fetched label page lives here: the title
//! and warning helpers, the dosage-form classifier, the inactive-ingredient
//! extractor, and the allergen filter.

mod allergen;
mod classifier;
mod ingredients;
mod page;

pub use allergen::{contains_allergen, Allergen, AllergenReport};
pub use classifier::{
    AiFormStrategy, ClassificationResult, Confidence, FormStrategy, KeywordFormStrategy,
    PageClassifier,
};
pub use ingredients::{
    AiIngredientStrategy, IngredientExtractionResult, IngredientExtractor, IngredientStrategy,
    MarkupIngredientStrategy,
};
pub use page::{extract_title, has_inactive_ndc_warning};

use crate::url::CandidateReference;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::fmt;

/// Which implementation produced an analysis result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// The probabilistic backend
    Primary,
    /// The deterministic rules
    Fallback,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Dosage form of a labelled product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormType {
    Capsule,
    Liquid,
    Tablet,
    Other,
}

impl FormType {
    /// Only capsules, liquids, and tablets may proceed past classification
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, Self::Other)
    }

    /// Parses one of the four form labels, ignoring case and a trailing period
    ///
    /// Anything outside the vocabulary yields None.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().trim_end_matches('.').trim().to_lowercase();
        match label.as_str() {
            "capsule" => Some(Self::Capsule),
            "liquid" => Some(Self::Liquid),
            "tablet" => Some(Self::Tablet),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capsule => "capsule",
            Self::Liquid => "liquid",
            Self::Tablet => "tablet",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw content fetched for one candidate
///
/// The title is pulled out once at construction; the document itself is
/// re-parsed by each analysis step because parsed trees cannot cross an
/// await point.
#[derive(Debug, Clone)]
pub struct LabelPage {
    pub reference: CandidateReference,
    pub raw_html: String,
    pub fetched_at: DateTime<Utc>,
    title: Option<String>,
}

impl LabelPage {
    pub fn new(reference: CandidateReference, raw_html: String) -> Self {
        let title = extract_title(&Html::parse_document(&raw_html));
        Self {
            reference,
            raw_html,
            fetched_at: Utc::now(),
            title,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Title for display, falling back to the label URL
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.reference.url)
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.raw_html)
    }
}

static UNII_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*UNII\s*:[^)]*\)").expect("valid UNII regex"));

static HEADING_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^inactive\s+(?:ingredients?|components?)\s*:?\s*")
        .expect("valid heading prefix regex")
});

static LEADING_AND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^and\s+").expect("valid leading-and regex"));

/// One inactive ingredient as listed on a label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ingredient {
    /// Cleaned-up form shown in reports
    pub display: String,
    /// Lowercase form used for matching
    pub normalized: String,
}

impl Ingredient {
    /// Cleans one raw list entry
    ///
    /// Returns None for entries that are too short or purely numeric.
    pub fn new(raw: &str) -> Option<Self> {
        let without_unii = UNII_RE.replace_all(raw, " ");
        let mut display = collapse_whitespace(&without_unii);

        display = HEADING_PREFIX_RE.replace(&display, "").into_owned();
        display = LEADING_AND_RE.replace(&display, "").into_owned();
        display = display
            .trim_matches(|c: char| {
                c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '*' | '•')
            })
            .to_string();

        if display.chars().count() <= 2 || display.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let normalized = display.to_lowercase();
        Some(Self {
            display,
            normalized,
        })
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

/// Cleans a list of raw entries, dropping rejects and later duplicates
pub fn normalize_ingredients<I, S>(raw: I) -> Vec<Ingredient>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|entry| Ingredient::new(entry.as_ref()))
        .filter(|ingredient| seen.insert(ingredient.normalized.clone()))
        .collect()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
