//! Validate config command implementation
//!
//! Loads the configuration and compiles the tag rules, so unresolvable
//! keywords are reported without touching any input.

use crate::anonymization::compliance::hipaa;
use crate::anonymization::rules::RuleSet;
use crate::config::{load_config, EngineKind};
use clap::Args;
use std::collections::BTreeSet;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let rules = match RuleSet::compile(&config.anonymization) {
            Ok(r) => {
                println!("✅ Tag rules compiled");
                r
            }
            Err(e) => {
                println!("❌ Tag rules failed to compile");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Workers: {}", config.application.workers);
        println!("  Input: {}", config.directories.input.display());
        println!("  Output: {}", config.directories.output.display());
        println!("  Quarantine: {}", config.directories.quarantine.display());
        println!("  Audit: {}", config.directories.audit.display());
        println!("  Key: {}", config.security.encryption_key_path.display());
        println!(
            "  Permissions: file {:o}, dir {:o}",
            config.security.file_permissions, config.security.dir_permissions
        );
        match config.engine.kind {
            EngineKind::Builtin => println!("  Engine: builtin"),
            EngineKind::External => println!(
                "  Engine: external ({}, timeout {}s)",
                config.engine.program.as_deref().unwrap_or("?"),
                config.engine.timeout_seconds
            ),
        }
        println!(
            "  Rules: {} remove, {} replace (fingerprint {})",
            rules.removals().count(),
            rules.replacements().count(),
            &rules.fingerprint()[..12]
        );

        let categories: BTreeSet<String> = config
            .anonymization
            .hipaa_tags
            .iter()
            .filter_map(|keyword| hipaa::identifier_for(keyword.trim()))
            .map(|category| category.to_string())
            .collect();
        println!(
            "  Safe Harbor categories: {}",
            categories.into_iter().collect::<Vec<_>>().join(", ")
        );

        let validation = config.validation;
        if !validation.verify_after_write {
            println!("  ⚠️  Post-write validation is DISABLED");
        } else if !validation.phi_check {
            println!("  ⚠️  PHI residue check is DISABLED");
        }

        for diagnostic in rules.diagnostics() {
            println!("  ⚠️  {diagnostic}");
        }
        println!();

        Ok(0)
    }
}
