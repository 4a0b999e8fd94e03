//! Output module for run reports
//!
//! This module handles:
//! - The run aggregate (qualified results, disqualifications, run metadata)
//! - Rendering the aggregate as a markdown document
//! - Printing the same content to the console

mod markdown;
pub mod stats;
mod summary;

pub use markdown::{format_report, write_report};
pub use stats::print_report;
pub use summary::{Disqualification, QualifiedResult, RunReport, RunStatus};

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while writing reports
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid filename regex"));

/// Turns a medication term into a filename stem
///
/// Keeps word characters, whitespace, and hyphens; spaces become underscores.
pub fn sanitize_term(term: &str) -> String {
    UNSAFE_CHARS
        .replace_all(term, "")
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Default report location: `<directory>/<sanitized term>_results.md`
pub fn default_output_path(term: &str, directory: &Path) -> PathBuf {
    let stem = sanitize_term(term);
    let stem = if stem.is_empty() { "medication" } else { &stem };
    directory.join(format!("{stem}_results.md"))
}
