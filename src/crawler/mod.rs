//! Crawler module for the DailyMed search and label pages
//!
//! This module contains the core pipeline logic, including:
//! - HTTP fetching with pacing and retry
//! - Results page parsing and candidate discovery
//! - Paginated collection with run-scoped deduplication
//! - Overall run coordination

mod collector;
mod coordinator;
mod fetcher;
mod parser;

pub use collector::{Collection, ResultCollector, StopReason};
pub use coordinator::{CandidateOutcome, Coordinator};
pub use fetcher::{build_http_client, FetchError, FetchFailure, Fetcher, RetryPolicy};
pub use parser::{parse_results_page, ResultsPage};

use crate::analysis::AnalysisBackend;
use crate::config::Config;
use crate::output::RunReport;
use crate::SieveError;
use std::sync::Arc;

/// Runs a complete search for one medication term
///
/// This is the main library entry point. It will:
/// 1. Validate the configuration
/// 2. Collect candidate labels across result pages
/// 3. Filter each candidate by form, warning, ingredients, and allergens
/// 4. Return the run report
///
/// # Arguments
///
/// * `config` - The run configuration
/// * `backend` - Optional analysis backend for the primary methods
/// * `term` - The medication name to search for
///
/// # Example
///
/// ```no_run
/// use label_sieve::config::Config;
/// use label_sieve::crawler::run_search;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let report = run_search(Config::default(), None, "hydrocortisone").await?;
/// println!("{} qualified", report.qualified.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_search(
    config: Config,
    backend: Option<Arc<dyn AnalysisBackend>>,
    term: &str,
) -> Result<RunReport, SieveError> {
    let coordinator = Coordinator::new(config, backend)?;
    coordinator.run(term).await
}
