//! Per-file processing results
//!
//! A [`ProcessingResult`] is created by the engine adapter, enriched by the
//! validator, and consumed by the quarantine manager and the audit logger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Terminal outcome of one input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Anonymized, validated and released to the output directory
    Success,
    /// The engine failed on this file
    QuarantinedEngineFailure,
    /// The engine output failed post-write validation
    QuarantinedValidationFailure,
    /// The file could not be processed (collision, I/O, audit failure)
    Error,
}

impl Outcome {
    /// Whether the file was released
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::QuarantinedEngineFailure => "quarantined_engine_failure",
            Outcome::QuarantinedValidationFailure => "quarantined_validation_failure",
            Outcome::Error => "error",
        };
        f.write_str(s)
    }
}

/// Machine-readable failure category
///
/// Engine failures are split by kind so compliance reporting can tell a
/// crashed engine from one that declined a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Engine process could not be started
    EngineLaunch,
    /// Engine exited with a non-zero status
    EngineExit,
    /// Engine was terminated by a signal
    EngineSignal,
    /// Engine did not finish within the configured timeout
    EngineTimeout,
    /// Engine reported success but its output is missing or unusable
    EngineOutput,
    /// Output file mode does not match the configured mode
    Permissions,
    /// Output is not a structurally valid DICOM file
    Integrity,
    /// A configured PHI tag survived anonymization
    PhiResidue,
    /// The output name is already taken
    OutputCollision,
    /// The audit record could not be written
    AuditWrite,
    /// Local I/O failure while handling the file
    Io,
}

impl ReasonCode {
    /// Stable string form, as written into sidecars and audit payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::EngineLaunch => "engine_launch",
            ReasonCode::EngineExit => "engine_exit",
            ReasonCode::EngineSignal => "engine_signal",
            ReasonCode::EngineTimeout => "engine_timeout",
            ReasonCode::EngineOutput => "engine_output",
            ReasonCode::Permissions => "permissions",
            ReasonCode::Integrity => "integrity",
            ReasonCode::PhiResidue => "phi_residue",
            ReasonCode::OutputCollision => "output_collision",
            ReasonCode::AuditWrite => "audit_write",
            ReasonCode::Io => "io",
        }
    }

    /// Whether this code belongs to the engine step
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            ReasonCode::EngineLaunch
                | ReasonCode::EngineExit
                | ReasonCode::EngineSignal
                | ReasonCode::EngineTimeout
                | ReasonCode::EngineOutput
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a file did not reach [`Outcome::Success`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Failure category
    pub code: ReasonCode,

    /// Free-form diagnostic (engine stderr, offending tag, I/O message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FailureReason {
    /// Creates a reason without detail
    pub fn new(code: ReasonCode) -> Self {
        Self { code, detail: None }
    }

    /// Creates a reason with a diagnostic detail
    pub fn with_detail(code: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.code, detail),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Result of processing one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Input file
    pub source_path: PathBuf,

    /// Engine output, if one was produced
    ///
    /// Until the file is released this is the hidden staging file.
    pub output_path: Option<PathBuf>,

    /// Final output name, while the output still sits in staging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_path: Option<PathBuf>,

    /// Current outcome
    pub outcome: Outcome,

    /// Failure reason for non-success outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,

    /// When the outcome was last updated
    pub timestamp: DateTime<Utc>,
}

impl ProcessingResult {
    /// Engine produced `output_path` successfully
    pub fn success(source_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            output_path: Some(output_path.into()),
            release_path: None,
            outcome: Outcome::Success,
            failure: None,
            timestamp: Utc::now(),
        }
    }

    /// Engine wrote `staging_path`; the file is released as `release_path`
    /// only once it has been validated
    pub fn staged(
        source_path: impl Into<PathBuf>,
        staging_path: impl Into<PathBuf>,
        release_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            release_path: Some(release_path.into()),
            ..Self::success(source_path, staging_path)
        }
    }

    /// Engine step failed; no output is kept
    pub fn engine_failure(source_path: impl Into<PathBuf>, reason: FailureReason) -> Self {
        Self {
            source_path: source_path.into(),
            output_path: None,
            release_path: None,
            outcome: Outcome::QuarantinedEngineFailure,
            failure: Some(reason),
            timestamp: Utc::now(),
        }
    }

    /// File could not be processed at all
    pub fn error(source_path: impl Into<PathBuf>, reason: FailureReason) -> Self {
        Self {
            source_path: source_path.into(),
            output_path: None,
            release_path: None,
            outcome: Outcome::Error,
            failure: Some(reason),
            timestamp: Utc::now(),
        }
    }

    /// Marks the result as failing validation, keeping the output path so the
    /// file can be quarantined
    pub fn into_validation_failure(mut self, reason: FailureReason) -> Self {
        self.outcome = Outcome::QuarantinedValidationFailure;
        self.failure = Some(reason);
        self.timestamp = Utc::now();
        self
    }

    /// Marks the result as an error, keeping the output path
    pub fn into_error(mut self, reason: FailureReason) -> Self {
        self.outcome = Outcome::Error;
        self.failure = Some(reason);
        self.timestamp = Utc::now();
        self
    }

    /// The output now lives under its final name
    pub fn into_released(mut self) -> Self {
        if let Some(release) = self.release_path.take() {
            self.output_path = Some(release);
        }
        self
    }

    /// Name the output is known by: the final name while staged
    pub fn output_name(&self) -> Option<&Path> {
        self.release_path.as_deref().or(self.output_path.as_deref())
    }

    /// Input file name, for logging and reports
    pub fn file_name(&self) -> String {
        file_name_of(&self.source_path)
    }

    /// Whether the file is (still) headed for release
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
