// dicom-deid - DICOM de-identification with an encrypted audit trail
// Copyright (c) 2025 dicom-deid Contributors
// Licensed under the MIT License

use clap::Parser;
use dicom_deid::cli::{Cli, Commands};
use dicom_deid::config::{load_config, LoggingConfig};
use dicom_deid::logging::init_logging;
use std::path::PathBuf;
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // File logging follows the configuration for `run`; every other command
    // logs to the console only. A broken config is reported by the command.
    let (log_level, logging_config, logs_dir) = match (cli.command.writes_log_files(), load_config(&cli.config)) {
        (true, Ok(config)) => (
            config.application.log_level.clone(),
            config.logging.clone(),
            config.directories.logs.clone(),
        ),
        _ => (
            "info".to_string(),
            LoggingConfig {
                local_enabled: false,
                ..LoggingConfig::default()
            },
            PathBuf::new(),
        ),
    };
    let log_level = cli.log_level.clone().unwrap_or(log_level);

    let _guard = match init_logging(&log_level, &logging_config, &logs_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(e.exit_code());
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "dicom-deid - DICOM de-identification"
    );

    // Create shutdown signal channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
        }

        eprintln!("\n⚠️  Shutdown signal received, finishing files in flight...");
        let _ = shutdown_tx.send(true);
    });

    let exit_code = match execute_command(&cli, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5
        }
    };

    // Flush file logs before exiting
    drop(_guard);
    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, shutdown_signal: watch::Receiver<bool>) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Run(args) => args.execute(&cli.config, shutdown_signal).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Rules(args) => args.execute(&cli.config).await,
        Commands::Audit(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
