//! Rules command implementation
//!
//! Compiles the configured tags and prints the rule script the external
//! engine would receive.

use super::report_error;
use crate::anonymization::rules::{render_script, write_script, RuleSet};
use crate::config::load_config;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the rules command
#[derive(Args, Debug, Default)]
pub struct RulesArgs {
    /// Write the script to this path instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RulesArgs {
    /// Execute the rules command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => return Ok(report_error("Failed to load configuration", &e)),
        };

        let rules = match RuleSet::compile(&config.anonymization) {
            Ok(r) => r,
            Err(e) => return Ok(report_error("Failed to compile rules", &e)),
        };

        for diagnostic in rules.diagnostics() {
            eprintln!("⚠️  {diagnostic}");
        }

        match &self.output {
            Some(path) => {
                if let Err(e) = write_script(&rules, path) {
                    return Ok(report_error("Failed to write rule script", &e));
                }
                eprintln!("✅ {} rule(s) written to {}", rules.len(), path.display());
            }
            None => print!("{}", render_script(&rules)),
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("deid.toml");
        std::fs::write(
            &config_path,
            "[anonymization]\nhipaa_tags = [\"PatientID\"]\nreplace_tags = []\n",
        )
        .unwrap();
        let script = dir.path().join("out/rules.script");

        let args = RulesArgs {
            output: Some(script.clone()),
        };
        let code = args.execute(config_path.to_str().unwrap()).await.unwrap();

        assert_eq!(code, 0);
        let content = std::fs::read_to_string(&script).unwrap();
        assert!(content.contains("remove (0010,0020) PatientID"));
    }

    #[tokio::test]
    async fn test_unknown_keyword_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("deid.toml");
        std::fs::write(&config_path, "[anonymization]\nhipaa_tags = [\"PatientNmae\"]\n").unwrap();

        let code = RulesArgs::default()
            .execute(config_path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
