//! Audit command implementation
//!
//! `audit verify` decrypts every record of the audit log with the configured
//! key and checks authentication and per-session sequence continuity.

use super::report_error;
use crate::anonymization::audit::{AuditEvent, AuditReader, AUDIT_LOG_FILE};
use crate::config::load_config;
use crate::security::{AuditCipher, KeyManager};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Arguments for the audit command
#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Audit subcommand
    #[command(subcommand)]
    pub command: AuditCommand,
}

/// Audit subcommands
#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Decrypt and verify the audit log
    Verify(VerifyArgs),
}

/// Arguments for `audit verify`
#[derive(Args, Debug, Default)]
pub struct VerifyArgs {
    /// Audit log to verify (default: `<directories.audit>/audit.log`)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Print each decrypted record as a JSON line
    #[arg(long)]
    pub decrypt: bool,
}

impl AuditArgs {
    /// Execute the audit command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        match &self.command {
            AuditCommand::Verify(args) => args.execute(config_path).await,
        }
    }
}

impl VerifyArgs {
    /// Execute `audit verify`
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => return Ok(report_error("Failed to load configuration", &e)),
        };

        // verification must never mint a new key
        let key = match KeyManager::from_config(&config.security).load() {
            Ok(k) => k,
            Err(e) => return Ok(report_error("Failed to load encryption key", &e)),
        };

        let path = self
            .path
            .clone()
            .unwrap_or_else(|| config.directories.audit.join(AUDIT_LOG_FILE));
        tracing::info!(path = %path.display(), key_id = %key.key_id(), "Verifying audit log");

        let verification = match AuditReader::new(AuditCipher::new(&key)).verify(&path) {
            Ok(v) => v,
            Err(e) => return Ok(report_error("Failed to read audit log", &e)),
        };

        if self.decrypt {
            for record in &verification.records {
                let line = serde_json::json!({
                    "header": &record.header,
                    "event": &record.event,
                });
                println!("{line}");
            }
        }

        let files = verification
            .records
            .iter()
            .filter(|r| matches!(r.event, AuditEvent::File(_)))
            .count();

        println!("🔍 Audit log: {}", path.display());
        println!("  Records: {}", verification.records.len());
        println!("  File records: {files}");
        println!("  Sessions: {}", verification.sessions.len());
        for (session, count) in &verification.sessions {
            println!("    - {session}: {count} record(s)");
        }
        println!();

        if verification.is_intact() {
            println!("✅ Audit log intact");
            Ok(0)
        } else {
            println!("❌ Audit log failed verification:");
            for issue in &verification.issues {
                println!("  - {issue}");
                tracing::warn!(line = issue.line, message = %issue.message, "Audit verification issue");
            }
            Ok(1)
        }
    }
}
