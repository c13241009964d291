//! Configuration schema types
//!
//! Every section is optional in the TOML file; the defaults reproduce the
//! stock deployment layout (`data/raw` → `data/anonymized`).

use crate::anonymization::compliance::hipaa;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeidConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Working directories
    #[serde(default)]
    pub directories: DirectoriesConfig,

    /// Tag rules
    #[serde(default)]
    pub anonymization: AnonymizationConfig,

    /// Post-write validation toggles
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Key location and file modes
    #[serde(default)]
    pub security: SecurityConfig,

    /// Anonymization engine selection
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DeidConfig {
    /// Validates the configuration
    ///
    /// Tag keywords are not resolved here; that happens when the rules are
    /// compiled, before any file is processed.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.directories.validate()?;
        self.anonymization.validate()?;
        self.security.validate()?;
        self.engine.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Size of the per-file worker pool
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            workers: default_workers(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.workers == 0 || self.workers > 256 {
            return Err(format!(
                "workers must be between 1 and 256, got {}",
                self.workers
            ));
        }

        Ok(())
    }
}

/// Working directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoriesConfig {
    /// Raw DICOM input
    #[serde(default = "default_input_dir")]
    pub input: PathBuf,

    /// Released, anonymized output
    #[serde(default = "default_output_dir")]
    pub output: PathBuf,

    /// Files that failed the engine or validation
    #[serde(default = "default_quarantine_dir")]
    pub quarantine: PathBuf,

    /// Operational logs
    #[serde(default = "default_logs_dir")]
    pub logs: PathBuf,

    /// Encrypted audit store
    #[serde(default = "default_audit_dir")]
    pub audit: PathBuf,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            input: default_input_dir(),
            output: default_output_dir(),
            quarantine: default_quarantine_dir(),
            logs: default_logs_dir(),
            audit: default_audit_dir(),
        }
    }
}

impl DirectoriesConfig {
    fn validate(&self) -> Result<(), String> {
        let named = [
            ("input", &self.input),
            ("output", &self.output),
            ("quarantine", &self.quarantine),
            ("logs", &self.logs),
            ("audit", &self.audit),
        ];

        for (name, path) in &named {
            if path.as_os_str().is_empty() {
                return Err(format!("directories.{name} cannot be empty"));
            }
        }

        // input, output and quarantine must never alias each other
        for (i, (a_name, a)) in named.iter().take(3).enumerate() {
            for (b_name, b) in named.iter().take(3).skip(i + 1) {
                if a == b {
                    return Err(format!(
                        "directories.{a_name} and directories.{b_name} must differ ({})",
                        a.display()
                    ));
                }
            }
        }

        Ok(())
    }
}

/// An additional tag to remove, by keyword and/or explicit address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalTag {
    /// Dictionary keyword (e.g. `StudyID`)
    #[serde(default)]
    pub name: Option<String>,

    /// Group number
    #[serde(default)]
    pub group: Option<u16>,

    /// Element number
    #[serde(default)]
    pub element: Option<u16>,
}

impl AdditionalTag {
    /// Tag given by keyword only
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            group: None,
            element: None,
        }
    }

    /// Tag given by address only
    pub fn address(group: u16, element: u16) -> Self {
        Self {
            name: None,
            group: Some(group),
            element: Some(element),
        }
    }
}

/// A tag whose value is replaced with a fixed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceTag {
    /// Dictionary keyword
    pub name: String,

    /// Exact value the output must carry
    pub value: String,
}

impl ReplaceTag {
    /// Creates a replacement entry
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Tag rules configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizationConfig {
    /// Baseline keywords always removed
    #[serde(default = "default_hipaa_tags")]
    pub hipaa_tags: Vec<String>,

    /// Deployment-specific removals
    #[serde(default)]
    pub additional_tags: Vec<AdditionalTag>,

    /// Deployment-specific fixed replacements
    #[serde(default = "default_replace_tags")]
    pub replace_tags: Vec<ReplaceTag>,
}

impl Default for AnonymizationConfig {
    fn default() -> Self {
        Self {
            hipaa_tags: default_hipaa_tags(),
            additional_tags: Vec::new(),
            replace_tags: default_replace_tags(),
        }
    }
}

impl AnonymizationConfig {
    fn validate(&self) -> Result<(), String> {
        for tag in &self.additional_tags {
            let has_name = tag.name.as_deref().is_some_and(|n| !n.trim().is_empty());
            let has_address = tag.group.is_some() && tag.element.is_some();
            if !has_name && !has_address {
                return Err(
                    "anonymization.additional_tags entries need a name or both group and element"
                        .to_string(),
                );
            }
            if tag.group.is_some() != tag.element.is_some() {
                return Err(format!(
                    "anonymization.additional_tags entry {:?} sets only one of group/element",
                    tag.name.as_deref().unwrap_or("<unnamed>")
                ));
            }
        }

        if let Some(empty) = self.hipaa_tags.iter().find(|n| n.trim().is_empty()) {
            return Err(format!("anonymization.hipaa_tags contains an empty name: {empty:?}"));
        }

        if self.replace_tags.iter().any(|t| t.name.trim().is_empty()) {
            return Err("anonymization.replace_tags entries need a name".to_string());
        }

        Ok(())
    }
}

/// Post-write validation toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Master switch for all checks
    #[serde(default = "default_true")]
    pub verify_after_write: bool,

    /// Output file mode must match `security.file_permissions`
    #[serde(default = "default_true")]
    pub check_permissions: bool,

    /// Output must parse as DICOM with a readable header
    #[serde(default = "default_true")]
    pub integrity_check: bool,

    /// No configured PHI may survive
    #[serde(default = "default_true")]
    pub phi_check: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            verify_after_write: true,
            check_permissions: true,
            integrity_check: true,
            phi_check: true,
        }
    }
}

/// Key location and file modes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Audit encryption key file
    #[serde(default = "default_encryption_key_path")]
    pub encryption_key_path: PathBuf,

    /// Mode applied to (and required of) released files, e.g. `0o600`
    #[serde(default = "default_file_permissions")]
    pub file_permissions: u32,

    /// Mode applied to directories this tool creates, e.g. `0o700`
    #[serde(default = "default_dir_permissions")]
    pub dir_permissions: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key_path: default_encryption_key_path(),
            file_permissions: default_file_permissions(),
            dir_permissions: default_dir_permissions(),
        }
    }
}

impl SecurityConfig {
    fn validate(&self) -> Result<(), String> {
        if self.encryption_key_path.as_os_str().is_empty() {
            return Err("security.encryption_key_path cannot be empty".to_string());
        }

        if self.file_permissions > 0o777 {
            return Err(format!(
                "security.file_permissions {:o} is not a valid mode",
                self.file_permissions
            ));
        }
        if self.file_permissions & 0o400 == 0 {
            return Err(format!(
                "security.file_permissions {:o} must allow owner read for validation",
                self.file_permissions
            ));
        }

        if self.dir_permissions > 0o777 {
            return Err(format!(
                "security.dir_permissions {:o} is not a valid mode",
                self.dir_permissions
            ));
        }
        if self.dir_permissions & 0o700 != 0o700 {
            return Err(format!(
                "security.dir_permissions {:o} must grant the owner rwx",
                self.dir_permissions
            ));
        }

        Ok(())
    }
}

/// Which engine performs the tag rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process rewrite with dicom-rs
    #[default]
    Builtin,
    /// Third-party executable driven by a rule script
    External,
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "builtin" => Ok(Self::Builtin),
            "external" => Ok(Self::External),
            _ => Err(format!(
                "Invalid engine kind '{s}'. Must be one of: builtin, external"
            )),
        }
    }
}

/// Anonymization engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine implementation
    #[serde(default)]
    pub kind: EngineKind,

    /// Executable for the external engine
    #[serde(default)]
    pub program: Option<String>,

    /// Arguments; `{script}`, `{input}` and `{output}` are expanded per file
    #[serde(default = "default_engine_args")]
    pub args: Vec<String>,

    /// Where the compiled rule script is written
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,

    /// Per-file limit before the engine is killed
    #[serde(default = "default_engine_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            program: None,
            args: default_engine_args(),
            script_path: default_script_path(),
            timeout_seconds: default_engine_timeout_seconds(),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), String> {
        if self.kind == EngineKind::External {
            match self.program.as_deref() {
                Some(p) if !p.trim().is_empty() => {}
                _ => {
                    return Err(
                        "engine.program is required when engine.kind = 'external'".to_string()
                    )
                }
            }
            if !self.args.iter().any(|a| a.contains("{output}")) {
                return Err("engine.args must reference {output}".to_string());
            }
        }

        if self.timeout_seconds == 0 || self.timeout_seconds > 3600 {
            return Err(format!(
                "engine.timeout_seconds must be between 1 and 3600, got {}",
                self.timeout_seconds
            ));
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON logs into `directories.logs`
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Log rotation strategy (daily, hourly, never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_rotation: default_local_rotation(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid = ["daily", "hourly", "never"];
        if !valid.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid.join(", ")
            ));
        }
        Ok(())
    }
}

// Default value functions

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(16)
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/anonymized")
}

fn default_quarantine_dir() -> PathBuf {
    PathBuf::from("data/quarantine")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("audit_logs")
}

fn default_hipaa_tags() -> Vec<String> {
    hipaa::default_tag_names()
}

fn default_replace_tags() -> Vec<ReplaceTag> {
    vec![
        ReplaceTag::new("PatientName", "ANONYMOUS"),
        ReplaceTag::new("InstitutionName", "ANONYMOUS_INSTITUTION"),
        ReplaceTag::new("ReferringPhysicianName", "ANONYMOUS_PHYSICIAN"),
    ]
}

fn default_true() -> bool {
    true
}

fn default_encryption_key_path() -> PathBuf {
    PathBuf::from("config/encryption.key")
}

fn default_file_permissions() -> u32 {
    0o600
}

fn default_dir_permissions() -> u32 {
    0o700
}

fn default_engine_args() -> Vec<String> {
    vec![
        "--script".to_string(),
        "{script}".to_string(),
        "{input}".to_string(),
        "{output}".to_string(),
    ]
}

fn default_script_path() -> PathBuf {
    PathBuf::from("config/anonymization.script")
}

fn default_engine_timeout_seconds() -> u64 {
    300
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
