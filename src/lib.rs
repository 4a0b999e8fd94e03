//! Label-Sieve: an allergen-aware medication label filter
//!
//! This crate crawls the DailyMed label search, collects every candidate label
//! for a medication term, and keeps only the labels in an acceptable dosage
//! form whose inactive ingredients are free of a fixed allergen list.

pub mod analysis;
pub mod config;
pub mod crawler;
pub mod label;
pub mod output;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Label-Sieve operations
#[derive(Debug, Error)]
pub enum SieveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Initial search failed: {0}")]
    SearchFailed(#[from] crawler::FetchFailure),

    #[error("Invalid search term: {0}")]
    InvalidTerm(String),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Analysis backend error: {0}")]
    Analysis(#[from] analysis::AnalysisError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PipelineStage,
        to: state::PipelineStage,
    },

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Label-Sieve operations
pub type Result<T> = std::result::Result<T, SieveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_search, Coordinator};
pub use label::{Allergen, FormType, Ingredient, LabelPage, Method};
pub use output::{QualifiedResult, RunReport};
pub use state::{DisqualifyReason, PipelineStage};
pub use url::{CandidateReference, SearchQuery};
