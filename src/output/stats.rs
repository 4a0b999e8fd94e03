//! Console rendering of run reports
//!
//! Same content as the markdown report, laid out for a terminal.

use super::{RunReport, RunStatus};

/// Renders the console layout of a report
pub fn render_console(report: &RunReport) -> String {
    let rule = "=".repeat(60);
    let mut out = Vec::new();

    out.push(rule.clone());
    out.push(format!("Search Results for: {}", report.term));
    out.push(rule);
    out.push(String::new());

    if report.status == RunStatus::Interrupted {
        out.push("(interrupted: partial results)".to_string());
        out.push(String::new());
    }

    out.push("Qualified Medications:".to_string());
    out.push(String::new());
    if report.qualified.is_empty() {
        out.push("  No qualified medications found.".to_string());
    } else {
        for (i, result) in report.qualified.iter().enumerate() {
            out.push(format!("  {}. {}", i + 1, result.title));
            out.push(format!("     {}", result.url));
            out.push(format!("     Form: {}", result.form));
            if !result.ingredients.is_empty() {
                out.push(format!("     Inactive: {}", result.ingredients.join(", ")));
            }
        }
    }
    out.push(String::new());
    out.push(format!("Total: {} qualified result(s)", report.qualified.len()));
    out.push(String::new());

    if report.candidates_found == 0 {
        out.push("No candidate labels were found for this search.".to_string());
    } else {
        out.push(format!(
            "Processed {} of {} candidates from {} search page(s):",
            report.candidates_processed(),
            report.candidates_found,
            report.pages_fetched
        ));

        let mut counts: Vec<_> = report.reason_counts().into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out.push(format!("  {:<32} {}", "Qualified", report.qualified.len()));
        for (reason, count) in counts {
            out.push(format!("  {:<32} {}", reason.describe(), count));
        }
    }
    out.push(String::new());
    out.push(format!("Analysis: {}", report.analysis_mode()));

    out.join("\n")
}

/// Prints the report to stdout
pub fn print_report(report: &RunReport) {
    println!("{}", render_console(report));
}
