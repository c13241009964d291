//! CLI interface and argument parsing
//!
//! Exit codes shared by all commands:
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | success / batch valid |
//! | 1 | batch invalid, or audit log failed verification |
//! | 2 | configuration error |
//! | 3 | encryption key unavailable or corrupt |
//! | 4 | audit write failure |
//! | 5 | other fatal error |

pub mod commands;

use clap::{Parser, Subcommand};

/// dicom-deid - DICOM de-identification with an encrypted audit trail
#[derive(Parser, Debug)]
#[command(name = "dicom-deid")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "dicom-deid.toml", env = "DEID_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "DEID_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Anonymize every DICOM file in the input directory
    Run(commands::run::RunArgs),

    /// Validate configuration file and tag rules
    ValidateConfig(commands::validate::ValidateArgs),

    /// Print the compiled rule script
    Rules(commands::rules::RulesArgs),

    /// Inspect the encrypted audit log
    Audit(commands::audit::AuditArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Whether the command writes operational log files
    pub fn writes_log_files(&self) -> bool {
        matches!(self, Commands::Run(_))
    }
}
