//! Configuration management.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Configuration files support:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `DEID_<SECTION>_<KEY>` environment overrides
//! - Default values for every setting
//! - Validation before any file is touched
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dicom_deid::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("deid.toml")?;
//!
//! println!("Input: {}", config.directories.input.display());
//! println!("Workers: {}", config.application.workers);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and worker pool size
//! - [`DirectoriesConfig`] - Input, output, quarantine, log and audit directories
//! - [`AnonymizationConfig`] - Baseline, additional and replacement tags
//! - [`ValidationConfig`] - Post-write check toggles
//! - [`SecurityConfig`] - Key path and file modes
//! - [`EngineConfig`] - Engine selection and invocation
//! - [`LoggingConfig`] - Local log file settings
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//! workers = 4
//!
//! [directories]
//! input = "/srv/pacs/export"
//! output = "/srv/research/release"
//! quarantine = "/srv/research/quarantine"
//!
//! [anonymization]
//! replace_tags = [
//!     { name = "PatientName", value = "ANONYMOUS" },
//!     { name = "InstitutionName", value = "ANONYMOUS_INSTITUTION" },
//! ]
//!
//! [[anonymization.additional_tags]]
//! name = "StudyDescription"
//!
//! [security]
//! encryption_key_path = "${DEID_KEY_DIR}/encryption.key"
//! file_permissions = 0o600
//!
//! [engine]
//! kind = "external"
//! program = "/opt/ctp/bin/dicom-anonymizer"
//! ```

pub mod loader;
pub mod schema;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    AdditionalTag, AnonymizationConfig, ApplicationConfig, DeidConfig, DirectoriesConfig,
    EngineConfig, EngineKind, LoggingConfig, ReplaceTag, SecurityConfig, ValidationConfig,
};
