//! Run command implementation
//!
//! Anonymizes one batch: every `.dcm` file in the input directory.

use super::report_error;
use crate::config::load_config;
use crate::core::batch::{BatchCoordinator, BatchReport};
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Override the input directory
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Override the output directory
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Print the batch report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Starting run command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => return Ok(report_error("Failed to load configuration", &e)),
        };

        if let Some(input) = &self.input {
            tracing::info!(input = %input.display(), "Overriding input directory from CLI");
            config.directories.input = input.clone();
        }
        if let Some(output) = &self.output {
            tracing::info!(output = %output.display(), "Overriding output directory from CLI");
            config.directories.output = output.clone();
        }

        let coordinator = match BatchCoordinator::new(config) {
            Ok(c) => c,
            Err(e) => return Ok(report_error("Failed to start session", &e)),
        };

        let report = match coordinator.run(shutdown_signal).await {
            Ok(r) => r,
            Err(e) => return Ok(report_error("Batch aborted", &e)),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        Ok(if report.is_valid() { 0 } else { 1 })
    }
}

fn print_report(report: &BatchReport) {
    println!();
    println!("📊 Batch Summary:");
    println!("  Session: {}", report.session_id);
    println!("  Total Files: {}", report.total);
    println!("  Released: {}", report.succeeded);
    println!("  Quarantined / Error: {}", report.failed);
    println!("  Skipped: {}", report.skipped);
    println!("  Duration: {:.2}s", report.duration.as_secs_f64());
    println!();

    let failures: Vec<_> = report
        .files
        .iter()
        .filter(|f| !f.outcome.is_success())
        .collect();
    if !failures.is_empty() {
        println!("⚠️  Files not released:");
        for line in failures.iter().take(20) {
            match line.reason {
                Some(reason) => println!("  - {} ({}: {})", line.file, line.outcome, reason),
                None => println!("  - {} ({})", line.file, line.outcome),
            }
        }
        if failures.len() > 20 {
            println!("  ... and {} more", failures.len() - 20);
        }
        println!();
    }

    if report.is_valid() {
        println!("✅ Batch valid: every file was anonymized and verified");
    } else if report.total == 0 {
        println!("⚠️  Batch invalid: no input files found");
    } else {
        println!("⚠️  Batch invalid");
    }
}
