//! Domain error types
//!
//! Process-fatal failures are modelled here. Per-file failures (engine or
//! validation) are *outcomes* carried by [`ProcessingResult`](super::ProcessingResult)
//! and never surface as errors.

use thiserror::Error;

/// Main error type
///
/// Each variant aborts the run. Configuration and key errors happen before
/// any file is touched; an audit write failure only after the affected file
/// has been quarantined.
#[derive(Debug, Error)]
pub enum DeidError {
    /// Configuration-related errors, including unresolvable tag keywords
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No key exists and none could be created
    #[error("Encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// A key file exists but does not hold a valid key
    #[error("Encryption key corrupt: {0}")]
    KeyCorrupt(String),

    /// Engine setup failures (rule script, staging directory)
    #[error("Engine error: {0}")]
    Engine(String),

    /// Quarantine store failures
    #[error("Quarantine error: {0}")]
    Quarantine(String),

    /// The audit record could not be durably written
    #[error("Audit write failure: {0}")]
    AuditWrite(String),

    /// Audit log could not be decrypted or failed verification
    #[error("Audit verification failure: {0}")]
    AuditVerify(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl DeidError {
    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            DeidError::Configuration(_) => 2,
            DeidError::KeyUnavailable(_) | DeidError::KeyCorrupt(_) => 3,
            DeidError::AuditWrite(_) | DeidError::AuditVerify(_) => 4,
            _ => 5,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for DeidError {
    fn from(err: std::io::Error) -> Self {
        DeidError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for DeidError {
    fn from(err: serde_json::Error) -> Self {
        DeidError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for DeidError {
    fn from(err: toml::de::Error) -> Self {
        DeidError::Configuration(format!("TOML parse error: {err}"))
    }
}
