//! Search coordinator - main pipeline orchestration logic
//!
//! This module ties the pieces of a run together:
//! - Collecting candidate labels from the paginated search
//! - Walking each candidate through the disqualification pipeline
//! - Honoring interrupts at page and candidate boundaries
//! - Assembling the run report

use super::collector::{ResultCollector, StopReason};
use super::fetcher::{build_http_client, Fetcher, RetryPolicy};
use crate::analysis::{AnalysisBackend, BackendGate};
use crate::config::{validate, Config};
use crate::label::{
    contains_allergen, IngredientExtractionResult, IngredientExtractor, LabelPage,
    PageClassifier,
};
use crate::output::{Disqualification, QualifiedResult, RunReport, RunStatus};
use crate::state::{CandidateState, DisqualifyReason, PipelineStage};
use crate::url::CandidateReference;
use crate::SieveError;
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Terminal result for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Qualified(QualifiedResult),
    Disqualified(Disqualification),
}

/// Main pipeline coordinator
///
/// Candidates are processed one at a time in collector order. Search pages
/// and label pages are paced independently.
pub struct Coordinator {
    config: Arc<Config>,
    pagination: Fetcher,
    labels: Fetcher,
    classifier: PageClassifier,
    extractor: IngredientExtractor,
    gate: Arc<BackendGate>,
    config_hash: Option<String>,
    interrupted: Arc<AtomicBool>,
}

impl Coordinator {
    /// Creates a new coordinator
    ///
    /// # Arguments
    ///
    /// * `config` - The run configuration
    /// * `backend` - Analysis backend, or None to use only the fallback methods
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(SieveError)` - Invalid configuration or HTTP client setup failed
    pub fn new(
        config: Config,
        backend: Option<Arc<dyn AnalysisBackend>>,
    ) -> Result<Self, SieveError> {
        validate(&config)?;

        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.fetcher.timeout_secs),
        )?;
        let retry = RetryPolicy::from_config(&config.fetcher);

        let pagination = Fetcher::new(
            "pagination",
            client.clone(),
            Duration::from_millis(config.fetcher.pagination_delay_ms),
            retry,
        );
        let labels = Fetcher::new(
            "labels",
            client,
            Duration::from_millis(config.fetcher.label_delay_ms),
            retry,
        );

        let gate = Arc::new(BackendGate::new(
            backend.is_some(),
            config.analysis.max_failures,
        ));
        match &backend {
            Some(backend) => tracing::info!(
                "Using {} backend ({}) with fallback methods",
                backend.backend_name(),
                backend.model_name()
            ),
            None => tracing::info!("No analysis backend configured; using fallback methods only"),
        }

        Ok(Self {
            classifier: PageClassifier::new(backend.clone(), gate.clone()),
            extractor: IngredientExtractor::new(backend, gate.clone()),
            config: Arc::new(config),
            pagination,
            labels,
            gate,
            config_hash: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Records the configuration hash in the report
    pub fn with_config_hash(mut self, hash: String) -> Self {
        self.config_hash = Some(hash);
        self
    }

    /// Flag that stops the run at the next page or candidate boundary once set
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one search end to end
    ///
    /// Fails only when the term is blank, the configuration is unusable, or
    /// the first results page cannot be fetched. Every per-candidate problem
    /// ends up as a disqualification in the report.
    pub async fn run(&self, term: &str) -> Result<RunReport, SieveError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(SieveError::InvalidTerm(
                "medication name cannot be empty".to_string(),
            ));
        }

        let started_at = Utc::now();
        tracing::info!("Searching DailyMed for {:?}", term);

        let collection = ResultCollector::new(&self.pagination, &self.config.search, term)
            .with_interrupt(self.interrupted.clone())
            .collect()
            .await?;
        tracing::info!(
            "Found {} unique labels across {} page(s) ({})",
            collection.candidates.len(),
            collection.pages_fetched,
            collection.stop_reason
        );

        let mut report = RunReport::new(term, started_at, collection.stop_reason);
        report.pages_fetched = collection.pages_fetched;
        report.candidates_found = collection.candidates.len();
        if collection.stop_reason == StopReason::Interrupted {
            report.status = RunStatus::Interrupted;
        }

        let total = collection.candidates.len();
        for (i, reference) in collection.candidates.iter().enumerate() {
            if self.interrupted.load(Ordering::SeqCst) {
                tracing::warn!("Interrupted after {} of {} candidates", i, total);
                report.status = RunStatus::Interrupted;
                break;
            }

            match self.process_candidate(reference).await? {
                CandidateOutcome::Qualified(result) => {
                    tracing::info!("[{}/{}] Qualified: {}", i + 1, total, result.title);
                    report.qualified.push(result);
                }
                CandidateOutcome::Disqualified(entry) => {
                    tracing::info!(
                        "[{}/{}] Disqualified ({}): {}",
                        i + 1,
                        total,
                        entry.reason,
                        entry.title.as_deref().unwrap_or(&entry.reference.url)
                    );
                    report.disqualified.push(entry);
                }
            }
        }

        report.finished_at = Some(Utc::now());
        report.primary_configured = self.gate.is_configured();
        report.primary_degraded = self.gate.is_configured() && !self.gate.is_open();
        report.config_hash = self.config_hash.clone();

        tracing::info!(
            "Run {}: {} qualified, {} disqualified",
            report.status,
            report.qualified.len(),
            report.disqualified.len()
        );
        Ok(report)
    }

    /// Walks one candidate through the pipeline
    ///
    /// Stops at the first failing filter. Only an out-of-order stage
    /// transition is an error.
    pub async fn process_candidate(
        &self,
        reference: &CandidateReference,
    ) -> Result<CandidateOutcome, SieveError> {
        let mut state = CandidateState::new();

        let html = match self.labels.fetch(&reference.url).await {
            Ok(html) => html,
            Err(failure) => {
                state.disqualify(DisqualifyReason::FetchFailure)?;
                return Ok(disqualified(
                    reference,
                    None,
                    DisqualifyReason::FetchFailure,
                    failure.to_string(),
                ));
            }
        };
        state.advance(PipelineStage::Fetched)?;

        let page = LabelPage::new(reference.clone(), html);
        let title = page.title().map(str::to_string);

        let classification = self.classifier.classify(&page).await;
        if !classification.form.is_acceptable() {
            state.disqualify(DisqualifyReason::BadForm)?;
            return Ok(disqualified(
                reference,
                title,
                DisqualifyReason::BadForm,
                format!("form {} ({})", classification.form, classification.method),
            ));
        }
        state.advance(PipelineStage::Classified)?;

        let extraction = self.extractor.extract(&page).await;
        if extraction.warning_present {
            state.disqualify(DisqualifyReason::InactiveNdcWarning)?;
            return Ok(disqualified(
                reference,
                title,
                DisqualifyReason::InactiveNdcWarning,
                "label marked as inactive NDC".to_string(),
            ));
        }
        state.advance(PipelineStage::WarningChecked)?;

        let IngredientExtractionResult {
            ingredients,
            method,
            ..
        } = extraction;
        if ingredients.is_empty() {
            state.disqualify(DisqualifyReason::UnknownIngredients)?;
            return Ok(disqualified(
                reference,
                title,
                DisqualifyReason::UnknownIngredients,
                format!("no inactive ingredients found ({})", method),
            ));
        }
        state.advance(PipelineStage::IngredientsExtracted)?;
        tracing::debug!(
            "{} inactive ingredients via {} on {}",
            ingredients.len(),
            method,
            reference.url
        );

        let allergens = contains_allergen(&ingredients);
        if allergens.contains_allergen() {
            state.disqualify(DisqualifyReason::AllergenPresent)?;
            return Ok(disqualified(
                reference,
                title,
                DisqualifyReason::AllergenPresent,
                allergens.summary(),
            ));
        }
        state.advance(PipelineStage::AllergenChecked)?;

        state.advance(PipelineStage::Qualified)?;
        Ok(CandidateOutcome::Qualified(QualifiedResult {
            title: page.display_title().to_string(),
            url: reference.url.clone(),
            form: classification.form,
            ingredients: ingredients.into_iter().map(|i| i.display).collect(),
        }))
    }
}

fn disqualified(
    reference: &CandidateReference,
    title: Option<String>,
    reason: DisqualifyReason,
    detail: String,
) -> CandidateOutcome {
    CandidateOutcome::Disqualified(Disqualification {
        reference: reference.clone(),
        title,
        reason,
        detail,
    })
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("pagination", &self.pagination)
            .field("labels", &self.labels)
            .field("classifier", &self.classifier)
            .field("extractor", &self.extractor)
            .field("config_hash", &self.config_hash)
            .finish()
    }
}
