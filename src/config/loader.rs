//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DeidConfig, EngineKind};
use crate::domain::errors::DeidError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into DeidConfig
/// 4. Applies environment variable overrides (DEID_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns [`DeidError::Configuration`] if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is unset or an override is malformed
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use dicom_deid::config::loader::load_config;
///
/// let config = load_config("deid.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<DeidConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(DeidError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        DeidError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration from TOML text, applying the same substitution,
/// overrides and validation as [`load_config`]
pub fn parse_config(contents: &str) -> Result<DeidConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: DeidConfig = toml::from_str(&contents)
        .map_err(|e| DeidError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        DeidError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are passed through untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| DeidError::Configuration(format!("Invalid substitution pattern: {}", e)))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(DeidError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        DeidError::Configuration(format!("Invalid value '{}' for {}: {}", value, name, e))
    })
}

/// Parses a file mode given as `600`, `0600` or `0o600`
fn parse_mode(name: &str, value: &str) -> Result<u32> {
    let digits = value.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8).map_err(|e| {
        DeidError::Configuration(format!("Invalid octal mode '{}' for {}: {}", value, name, e))
    })
}

/// Applies environment variable overrides using the DEID_* prefix
///
/// Variables follow the pattern `DEID_<SECTION>_<KEY>`, for example
/// `DEID_DIRECTORIES_OUTPUT` or `DEID_VALIDATION_PHI_CHECK`.
fn apply_env_overrides(config: &mut DeidConfig) -> Result<()> {
    let var = |name: &str| std::env::var(name).ok();

    // Application overrides
    if let Some(val) = var("DEID_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = var("DEID_APPLICATION_WORKERS") {
        config.application.workers = parse_env("DEID_APPLICATION_WORKERS", &val)?;
    }

    // Directory overrides
    if let Some(val) = var("DEID_DIRECTORIES_INPUT") {
        config.directories.input = PathBuf::from(val);
    }
    if let Some(val) = var("DEID_DIRECTORIES_OUTPUT") {
        config.directories.output = PathBuf::from(val);
    }
    if let Some(val) = var("DEID_DIRECTORIES_QUARANTINE") {
        config.directories.quarantine = PathBuf::from(val);
    }
    if let Some(val) = var("DEID_DIRECTORIES_LOGS") {
        config.directories.logs = PathBuf::from(val);
    }
    if let Some(val) = var("DEID_DIRECTORIES_AUDIT") {
        config.directories.audit = PathBuf::from(val);
    }

    // Validation overrides
    if let Some(val) = var("DEID_VALIDATION_VERIFY_AFTER_WRITE") {
        config.validation.verify_after_write =
            parse_env("DEID_VALIDATION_VERIFY_AFTER_WRITE", &val)?;
    }
    if let Some(val) = var("DEID_VALIDATION_CHECK_PERMISSIONS") {
        config.validation.check_permissions = parse_env("DEID_VALIDATION_CHECK_PERMISSIONS", &val)?;
    }
    if let Some(val) = var("DEID_VALIDATION_INTEGRITY_CHECK") {
        config.validation.integrity_check = parse_env("DEID_VALIDATION_INTEGRITY_CHECK", &val)?;
    }
    if let Some(val) = var("DEID_VALIDATION_PHI_CHECK") {
        config.validation.phi_check = parse_env("DEID_VALIDATION_PHI_CHECK", &val)?;
    }

    // Security overrides
    if let Some(val) = var("DEID_SECURITY_ENCRYPTION_KEY_PATH") {
        config.security.encryption_key_path = PathBuf::from(val);
    }
    if let Some(val) = var("DEID_SECURITY_FILE_PERMISSIONS") {
        config.security.file_permissions = parse_mode("DEID_SECURITY_FILE_PERMISSIONS", &val)?;
    }
    if let Some(val) = var("DEID_SECURITY_DIR_PERMISSIONS") {
        config.security.dir_permissions = parse_mode("DEID_SECURITY_DIR_PERMISSIONS", &val)?;
    }

    // Engine overrides
    if let Some(val) = var("DEID_ENGINE_KIND") {
        config.engine.kind = val.parse::<EngineKind>().map_err(DeidError::Configuration)?;
    }
    if let Some(val) = var("DEID_ENGINE_PROGRAM") {
        config.engine.program = Some(val);
    }
    if let Some(val) = var("DEID_ENGINE_SCRIPT_PATH") {
        config.engine.script_path = PathBuf::from(val);
    }
    if let Some(val) = var("DEID_ENGINE_TIMEOUT_SECONDS") {
        config.engine.timeout_seconds = parse_env("DEID_ENGINE_TIMEOUT_SECONDS", &val)?;
    }

    // Logging overrides
    if let Some(val) = var("DEID_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_env("DEID_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Some(val) = var("DEID_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("DEID_LOADER_TEST_VAR", "/srv/pacs/raw");
        let input = "input = \"${DEID_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "input = \"/srv/pacs/raw\"\n");
        std::env::remove_var("DEID_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("DEID_LOADER_MISSING_VAR");
        let input = "input = \"${DEID_LOADER_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("DEID_LOADER_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        let input = "# input = \"${DEID_LOADER_NEVER_SET}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_parse_mode_forms() {
        assert_eq!(parse_mode("x", "600").unwrap(), 0o600);
        assert_eq!(parse_mode("x", "0640").unwrap(), 0o640);
        assert_eq!(parse_mode("x", "0o700").unwrap(), 0o700);
        assert!(parse_mode("x", "rw-").is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-deid.toml");
        assert!(matches!(result, Err(DeidError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"
workers = 2

[directories]
input = "in"
output = "out"
quarantine = "q"

[anonymization]
hipaa_tags = ["PatientName", "PatientID"]
replace_tags = [{ name = "InstitutionName", value = "ANONYMOUS_INSTITUTION" }]

[[anonymization.additional_tags]]
name = "StudyID"

[security]
file_permissions = 0o600
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.workers, 2);
        assert_eq!(config.directories.output, PathBuf::from("out"));
        assert_eq!(config.anonymization.hipaa_tags.len(), 2);
        assert_eq!(config.anonymization.replace_tags[0].value, "ANONYMOUS_INSTITUTION");
    }

    #[test]
    fn test_load_config_invalid_values() {
        let toml_content = r#"
[application]
workers = 0
"#;
        let result = parse_config(toml_content);
        assert!(matches!(result, Err(DeidError::Configuration(_))));
    }
}
