//! Run aggregate
//!
//! The report is append-only while the run is in progress: qualified results
//! and disqualifications are pushed in candidate order and never reordered.

use crate::crawler::StopReason;
use crate::label::FormType;
use crate::state::DisqualifyReason;
use crate::url::CandidateReference;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// A label that passed every filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedResult {
    pub title: String,
    pub url: String,
    pub form: FormType,
    /// Inactive ingredients as displayed on the label
    pub ingredients: Vec<String>,
}

/// A label that was dropped, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disqualification {
    pub reference: CandidateReference,
    pub title: Option<String>,
    pub reason: DisqualifyReason,
    /// Human-readable detail, e.g. the matched allergens
    pub detail: String,
}

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The medication term searched for
    pub term: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,

    /// Search pages fetched successfully
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
    /// Unique candidates found by the collector
    pub candidates_found: usize,

    /// Qualified results in collector emission order
    pub qualified: Vec<QualifiedResult>,
    /// Disqualifications in collector emission order
    pub disqualified: Vec<Disqualification>,

    /// Whether a backend was configured for the run
    pub primary_configured: bool,
    /// Whether the backend was abandoned partway through
    pub primary_degraded: bool,

    /// Hash of the configuration file, if one was loaded
    pub config_hash: Option<String>,
}

impl RunReport {
    pub fn new(term: &str, started_at: DateTime<Utc>, stop_reason: StopReason) -> Self {
        Self {
            term: term.to_string(),
            started_at,
            finished_at: None,
            status: RunStatus::Completed,
            pages_fetched: 0,
            stop_reason,
            candidates_found: 0,
            qualified: Vec::new(),
            disqualified: Vec::new(),
            primary_configured: false,
            primary_degraded: false,
            config_hash: None,
        }
    }

    /// Candidates that reached a terminal stage
    pub fn candidates_processed(&self) -> usize {
        self.qualified.len() + self.disqualified.len()
    }

    /// Disqualification count per reason; reasons with no hits are omitted
    pub fn reason_counts(&self) -> BTreeMap<DisqualifyReason, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.disqualified {
            *counts.entry(entry.reason).or_insert(0) += 1;
        }
        counts
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }

    /// Short description of which analysis method was used
    pub fn analysis_mode(&self) -> &'static str {
        match (self.primary_configured, self.primary_degraded) {
            (false, _) => "fallback only (no backend configured)",
            (true, false) => "primary with fallback",
            (true, true) => "primary, degraded to fallback during run",
        }
    }
}
