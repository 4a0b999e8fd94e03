//! Probabilistic analysis backend abstraction
//!
//! The classifier and the ingredient extractor treat the language model as an
//! optional capability: a trait object behind a run-scoped [`BackendGate`].
//! When no credential is configured, or once the backend has failed too often,
//! every caller takes its deterministic path instead.

mod fake;
mod openai;

pub use fake::FakeBackend;
pub use openai::OpenAiBackend;

use crate::config::AnalysisConfig;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error type for backend calls
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API request timed out")]
    Timeout,

    #[error("API returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl AnalysisError {
    /// Returns true if the backend itself misbehaved
    ///
    /// Unusable answers (`ParseError`) only cost the current call; faults
    /// count toward tripping the [`BackendGate`].
    pub fn is_backend_fault(&self) -> bool {
        !matches!(self, Self::ParseError(_))
    }
}

/// Prompt envelope shared by all backends
#[derive(Debug, Clone)]
pub struct AnalysisRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
}

/// Trait for analysis backends
///
/// Implementations make one completion call per request and return the raw
/// text answer; interpreting the answer is the caller's job.
#[async_trait]
pub trait AnalysisBackend: Send + Sync + fmt::Debug {
    /// Send a request and get the model's text response
    async fn complete(&self, request: &AnalysisRequest<'_>) -> Result<String, AnalysisError>;

    /// Get the backend name (e.g., "openai", "fake")
    fn backend_name(&self) -> &'static str;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Builds the backend for a run, or None when no usable credential exists
///
/// A blank key counts as missing. The decision is made once per run.
pub fn create_backend(
    config: &AnalysisConfig,
    api_key: Option<&str>,
) -> Result<Option<Arc<dyn AnalysisBackend>>, AnalysisError> {
    let key = match api_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => key,
        None => return Ok(None),
    };

    let backend = OpenAiBackend::new(key, config)?;
    Ok(Some(Arc::new(backend)))
}

/// Run-scoped availability switch for the primary method
///
/// Starts closed when no backend is configured. Otherwise it trips after
/// `max_failures` backend faults and stays tripped for the rest of the run;
/// the transition is logged exactly once.
#[derive(Debug)]
pub struct BackendGate {
    configured: bool,
    max_failures: u32,
    failures: AtomicU32,
    tripped: AtomicBool,
}

impl BackendGate {
    pub fn new(configured: bool, max_failures: u32) -> Self {
        Self {
            configured,
            max_failures: max_failures.max(1),
            failures: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    /// A gate that never lets primary calls through
    pub fn disabled() -> Self {
        Self::new(false, 1)
    }

    /// Whether a primary call may be attempted now
    pub fn is_open(&self) -> bool {
        self.configured && !self.tripped.load(Ordering::Acquire)
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Records the outcome of a failed primary call
    pub fn record_failure(&self, error: &AnalysisError) {
        if !error.is_backend_fault() {
            tracing::debug!("Primary answer unusable: {}", error);
            return;
        }

        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!("Primary backend fault {}/{}: {}", failures, self.max_failures, error);

        if failures >= self.max_failures && !self.tripped.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                "Analysis backend failed {} times ({}); using fallback methods for the rest of the run",
                failures,
                error
            );
        }
    }
}
