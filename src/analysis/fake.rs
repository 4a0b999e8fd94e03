//! Fake analysis backend for testing.
//!
//! Responses are matched by prompt substring, and every prompt is recorded
//! so tests can assert which calls were (or were not) made.

use super::{AnalysisBackend, AnalysisError, AnalysisRequest};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// A deterministic backend for tests.
#[derive(Debug, Default)]
pub struct FakeBackend {
    /// (prompt substring, response) pairs, checked in insertion order
    responses: Vec<(String, String)>,
    /// Response when no pattern matches; None means "fail the call"
    default_response: Option<String>,
    /// Fail every call with a transport error
    failing: bool,
    /// Prompts received so far
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    /// A backend with no registered responses; unmatched prompts fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every call fails like an unreachable API.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Adds a response for prompts containing `prompt_contains` (case-insensitive).
    pub fn with_response(mut self, prompt_contains: &str, response: &str) -> Self {
        self.responses
            .push((prompt_contains.to_lowercase(), response.to_string()));
        self
    }

    /// Sets the response used when no pattern matches.
    pub fn with_default_response(mut self, response: &str) -> Self {
        self.default_response = Some(response.to_string());
        self
    }

    /// All prompts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of received prompts containing `needle` (case-insensitive).
    pub fn calls_containing(&self, needle: &str) -> usize {
        let needle = needle.to_lowercase();
        self.calls()
            .iter()
            .filter(|prompt| prompt.to_lowercase().contains(&needle))
            .count()
    }
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    async fn complete(&self, request: &AnalysisRequest<'_>) -> Result<String, AnalysisError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.prompt.to_string());

        if self.failing {
            return Err(AnalysisError::RequestFailed(
                "FakeBackend: configured to fail".to_string(),
            ));
        }

        let prompt = request.prompt.to_lowercase();
        if let Some((_, response)) = self
            .responses
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
        {
            return Ok(response.clone());
        }

        self.default_response.clone().ok_or_else(|| {
            AnalysisError::RequestFailed(format!(
                "FakeBackend: no response configured for prompt (first 100 chars): {}",
                request.prompt.chars().take(100).collect::<String>()
            ))
        })
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
