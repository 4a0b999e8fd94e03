//! Markdown report generation
//!
//! This module renders a run report as a markdown document: the qualified
//! results first, then the disqualification breakdown and run metadata.

use super::{OutputError, OutputResult, RunReport, RunStatus};
use crate::state::DisqualifyReason;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report to `output_path`
///
/// # Arguments
///
/// * `report` - The finished (or interrupted) run
/// * `output_path` - Path where the markdown file should be written
pub fn write_report(report: &RunReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_report(report);

    let write = |path: &Path| -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(markdown.as_bytes())
    };

    write(output_path).map_err(|source| OutputError::Write {
        path: output_path.display().to_string(),
        source,
    })
}

/// Formats a run report as markdown
pub fn format_report(report: &RunReport) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Search Results for: {}\n\n", report.term));

    if report.status == RunStatus::Interrupted {
        md.push_str("> **Note**: the run was interrupted; results below are partial.\n\n");
    }

    md.push_str("## Qualified Medications\n\n");
    md.push_str(
        "Capsule, liquid, or tablet forms with no listed eggs, corn, cornstarch, dextrose, lactose, whey, or wheat.\n\n",
    );

    if report.qualified.is_empty() {
        md.push_str("No qualified medications found.\n\n");
    } else {
        for (i, result) in report.qualified.iter().enumerate() {
            md.push_str(&format!("{}. **{}**\n", i + 1, result.title));
            md.push_str(&format!("   - URL: {}\n", result.url));
            md.push_str(&format!("   - Form: {}\n", capitalize(result.form.as_str())));
            if !result.ingredients.is_empty() {
                md.push_str(&format!(
                    "   - Inactive ingredients: {}\n",
                    result.ingredients.join(", ")
                ));
            }
            md.push('\n');
        }
    }

    md.push_str(&format!(
        "**Total: {} qualified result(s)**\n\n",
        report.qualified.len()
    ));

    // Disqualification breakdown
    md.push_str("## Disqualification Summary\n\n");
    if report.candidates_found == 0 {
        md.push_str("No candidate labels were found for this search.\n\n");
    } else {
        let counts = report.reason_counts();
        md.push_str("| Reason | Count |\n");
        md.push_str("|--------|-------|\n");
        for reason in DisqualifyReason::all() {
            md.push_str(&format!(
                "| {} | {} |\n",
                reason.describe(),
                counts.get(&reason).copied().unwrap_or(0)
            ));
        }
        md.push('\n');
    }

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Status**: {}\n", report.status));
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    if let Some(finished) = report.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = report.duration_seconds() {
        md.push_str(&format!("- **Duration**: {} seconds\n", duration));
    }
    md.push_str(&format!("- **Search pages fetched**: {}\n", report.pages_fetched));
    md.push_str(&format!("- **Pagination stopped**: {}\n", report.stop_reason));
    md.push_str(&format!(
        "- **Candidates processed**: {} of {}\n",
        report.candidates_processed(),
        report.candidates_found
    ));
    md.push_str(&format!("- **Analysis**: {}\n", report.analysis_mode()));
    if let Some(hash) = &report.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }

    md
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
