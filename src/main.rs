//! Label-Sieve main entry point
//!
//! This is the command-line interface for the Label-Sieve medication filter.

use anyhow::Context;
use clap::Parser;
use label_sieve::analysis::create_backend;
use label_sieve::config::{load_config_with_hash, Config};
use label_sieve::crawler::Coordinator;
use label_sieve::output::{default_output_path, print_report, write_report};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

/// Label-Sieve: find allergen-free medication labels on DailyMed
///
/// Label-Sieve searches DailyMed for a medication, visits every matching
/// label, and keeps the capsule, liquid, and tablet forms whose inactive
/// ingredients contain none of: eggs, corn, cornstarch, dextrose, lactose,
/// whey, wheat.
#[derive(Parser, Debug)]
#[command(name = "label-sieve")]
#[command(version = "1.0.0")]
#[command(about = "Filter DailyMed labels by dosage form and allergens", long_about = None)]
struct Cli {
    /// Medication name to search for (multiple words are joined)
    #[arg(value_name = "MEDICATION", required = true, num_args = 1..)]
    medication: Vec<String>,

    /// Where to write the markdown report
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// API key for the analysis backend (overrides the environment)
    #[arg(long, value_name = "KEY")]
    openai_key: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use only the deterministic fallback methods
    #[arg(long)]
    fallback_only: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let term = cli.medication.join(" ");

    let (config, config_hash) = load_configuration(cli.config.as_deref())?;

    let api_key = if cli.fallback_only {
        tracing::info!("Fallback-only mode requested");
        None
    } else {
        resolve_api_key(cli.openai_key, &config)
    };
    let backend = create_backend(&config.analysis, api_key.as_deref())
        .context("Failed to initialize analysis backend")?;

    let output_path = cli
        .output
        .unwrap_or_else(|| default_output_path(&term, Path::new(&config.output.directory)));

    let mut coordinator = Coordinator::new(config, backend)?;
    if let Some(hash) = config_hash {
        coordinator = coordinator.with_config_hash(hash);
    }

    // First Ctrl-C stops at the next page or label boundary; a second one exits
    let interrupted = coordinator.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received; press Ctrl-C again to abort");
        interrupted.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt received, aborting without a report");
            std::process::exit(130);
        }
    });

    let report = match coordinator.run(&term).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Search failed: {}", e);
            return Err(e.into());
        }
    };

    if !cli.quiet {
        print_report(&report);
    }

    write_report(&report, &output_path)
        .with_context(|| format!("Failed to save results for {:?}", term))?;
    tracing::info!("Results saved to: {}", output_path.display());

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("label_sieve=info,warn"),
            1 => EnvFilter::new("label_sieve=debug,info"),
            2 => EnvFilter::new("label_sieve=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file if one was given, otherwise the defaults
fn load_configuration(path: Option<&Path>) -> anyhow::Result<(Config, Option<String>)> {
    let Some(path) = path else {
        tracing::debug!("No configuration file given, using defaults");
        return Ok((Config::default(), None));
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok((config, Some(hash)))
}

/// Flag value first, then the configured environment variable
fn resolve_api_key(flag: Option<String>, config: &Config) -> Option<String> {
    flag.or_else(|| std::env::var(&config.analysis.api_key_env).ok())
        .filter(|key| !key.trim().is_empty())
}
