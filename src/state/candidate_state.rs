//! Per-candidate pipeline states
//!
//! A candidate walks a fixed linear path and may drop out to `Disqualified`
//! from any non-terminal stage. No stage is ever revisited.

use crate::SieveError;
use std::fmt;

/// Why a candidate was dropped from the results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DisqualifyReason {
    /// Dosage form is not capsule, liquid, or tablet
    BadForm,

    /// Label carries the inactive-NDC warning
    InactiveNdcWarning,

    /// No inactive-ingredient section could be located
    UnknownIngredients,

    /// At least one allergen appears among the inactive ingredients
    AllergenPresent,

    /// The label page could not be fetched
    FetchFailure,
}

impl DisqualifyReason {
    /// All reasons, in pipeline order
    pub fn all() -> [Self; 5] {
        [
            Self::FetchFailure,
            Self::BadForm,
            Self::InactiveNdcWarning,
            Self::UnknownIngredients,
            Self::AllergenPresent,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadForm => "bad_form",
            Self::InactiveNdcWarning => "inactive_ndc_warning",
            Self::UnknownIngredients => "unknown_ingredients",
            Self::AllergenPresent => "allergen_present",
            Self::FetchFailure => "fetch_failure",
        }
    }

    /// Human-readable label used in reports
    pub fn describe(&self) -> &'static str {
        match self {
            Self::BadForm => "Excluded dosage form",
            Self::InactiveNdcWarning => "Inactive NDC warning",
            Self::UnknownIngredients => "Inactive ingredients not found",
            Self::AllergenPresent => "Allergen present",
            Self::FetchFailure => "Label page unavailable",
        }
    }
}

impl fmt::Display for DisqualifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage of a candidate in the disqualification pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    // ===== Active Stages =====
    /// Reference collected, nothing fetched yet
    Pending,

    /// Label page fetched
    Fetched,

    /// Dosage form determined and acceptable
    Classified,

    /// Inactive-NDC warning checked and absent
    WarningChecked,

    /// Inactive ingredients located
    IngredientsExtracted,

    /// Ingredients checked against the allergen list
    AllergenChecked,

    // ===== Terminal Stages =====
    /// Candidate passed every filter
    Qualified,

    /// Candidate was dropped
    Disqualified(DisqualifyReason),
}

impl PipelineStage {
    /// Returns true if this is a terminal stage
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Qualified | Self::Disqualified(_))
    }

    /// The only stage that may follow this one on the success path
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Fetched),
            Self::Fetched => Some(Self::Classified),
            Self::Classified => Some(Self::WarningChecked),
            Self::WarningChecked => Some(Self::IngredientsExtracted),
            Self::IngredientsExtracted => Some(Self::AllergenChecked),
            Self::AllergenChecked => Some(Self::Qualified),
            Self::Qualified | Self::Disqualified(_) => None,
        }
    }

    /// Checks whether moving to `next` follows the pipeline
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Disqualified(_) => true,
            other => self.successor() == Some(other),
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetched => write!(f, "fetched"),
            Self::Classified => write!(f, "classified"),
            Self::WarningChecked => write!(f, "warning_checked"),
            Self::IngredientsExtracted => write!(f, "ingredients_extracted"),
            Self::AllergenChecked => write!(f, "allergen_checked"),
            Self::Qualified => write!(f, "qualified"),
            Self::Disqualified(reason) => write!(f, "disqualified({})", reason),
        }
    }
}

/// Tracks one candidate through the pipeline
///
/// Discarded once the candidate reaches a terminal stage.
#[derive(Debug, Clone)]
pub struct CandidateState {
    stage: PipelineStage,
}

impl CandidateState {
    pub fn new() -> Self {
        Self {
            stage: PipelineStage::Pending,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Moves to `next`, rejecting anything off the linear path
    pub fn advance(&mut self, next: PipelineStage) -> Result<PipelineStage, SieveError> {
        if !self.stage.can_transition_to(next) {
            return Err(SieveError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        Ok(next)
    }

    /// Drops the candidate with the given reason
    pub fn disqualify(&mut self, reason: DisqualifyReason) -> Result<PipelineStage, SieveError> {
        self.advance(PipelineStage::Disqualified(reason))
    }
}

impl Default for CandidateState {
    fn default() -> Self {
        Self::new()
    }
}
