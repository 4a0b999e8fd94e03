//! Allergen vocabulary and matching
//!
//! Matching is lexical only: synonyms and chemical derivatives that do not
//! spell out an allergen term are not detected.

use super::Ingredient;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

/// The fixed allergen list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Allergen {
    Eggs,
    Corn,
    Cornstarch,
    Dextrose,
    Lactose,
    Whey,
    Wheat,
}

impl Allergen {
    pub const ALL: [Allergen; 7] = [
        Self::Eggs,
        Self::Corn,
        Self::Cornstarch,
        Self::Dextrose,
        Self::Lactose,
        Self::Whey,
        Self::Wheat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eggs => "eggs",
            Self::Corn => "corn",
            Self::Cornstarch => "cornstarch",
            Self::Dextrose => "dextrose",
            Self::Lactose => "lactose",
            Self::Whey => "whey",
            Self::Wheat => "wheat",
        }
    }

    fn pattern(&self) -> &'static Regex {
        &PATTERNS[*self as usize]
    }

    /// Whether a normalized ingredient mentions this allergen
    pub fn matches(&self, normalized: &str) -> bool {
        self.pattern().is_match(normalized)
    }
}

impl fmt::Display for Allergen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Indexed by `Allergen as usize`.
static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\beggs?\b",
        r"\bcorn",
        r"\bcorn[\s-]*starch",
        r"dextrose",
        r"lactose",
        r"\bwhey",
        r"\bwheat",
    ]
    .iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("valid allergen regex"))
    .collect()
});

/// Every allergen found in an ingredient list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllergenReport {
    /// Distinct allergens found
    pub matches: BTreeSet<Allergen>,
    /// (ingredient display name, allergen) for each hit
    pub offending: Vec<(String, Allergen)>,
}

impl AllergenReport {
    pub fn contains_allergen(&self) -> bool {
        !self.matches.is_empty()
    }

    /// Matched allergen names joined for display, e.g. "corn, cornstarch"
    pub fn summary(&self) -> String {
        self.matches
            .iter()
            .map(Allergen::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Checks every ingredient against every allergen
///
/// All matches are kept, not just the first.
pub fn contains_allergen(ingredients: &[Ingredient]) -> AllergenReport {
    let mut report = AllergenReport::default();

    for ingredient in ingredients {
        for allergen in Allergen::ALL {
            if allergen.matches(&ingredient.normalized) {
                report.matches.insert(allergen);
                report.offending.push((ingredient.display.clone(), allergen));
            }
        }
    }

    report
}
