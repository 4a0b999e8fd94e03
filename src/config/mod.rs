//! Configuration module for Label-Sieve
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! A configuration file is optional; `Config::default()` targets the public
//! DailyMed site with conservative request pacing.
//!
//! # Example
//!
//! ```no_run
//! use label_sieve::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("label-sieve.toml")).unwrap();
//! println!("Page size: {}", config.search.page_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AnalysisConfig, Config, FetcherConfig, OutputConfig, SearchConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
