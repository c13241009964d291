//! Quarantine sidecar records

use crate::domain::{Outcome, ProcessingResult, ReasonCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Sidecar suffix appended to the quarantined file name
pub const SIDECAR_SUFFIX: &str = ".quarantine.json";

/// Which file was placed in quarantine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineOrigin {
    /// The engine output, moved out of the output directory
    Output,
    /// A copy of the input, when no usable output exists
    Source,
}

/// Progress of a quarantine move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineState {
    /// Sidecar written, file not yet (fully) moved
    Pending,
    /// File is in quarantine and verified
    Complete,
}

/// Metadata about a quarantined file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Unique identifier for this quarantine record
    pub id: Uuid,

    /// Session that quarantined the file
    pub session_id: Uuid,

    /// Input file
    pub source_path: PathBuf,

    /// Engine output the file came from, if any
    pub original_output: Option<PathBuf>,

    /// Location inside the quarantine directory
    pub quarantined_path: PathBuf,

    /// Which file was quarantined
    pub origin: QuarantineOrigin,

    /// Outcome that triggered quarantine
    pub outcome: Outcome,

    /// Failure category
    pub reason: ReasonCode,

    /// Failure diagnostic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// SHA-256 of the quarantined content
    pub sha256: String,

    /// Move progress
    pub state: QuarantineState,

    /// When the file was quarantined
    pub quarantined_at: DateTime<Utc>,
}

impl QuarantineRecord {
    /// Creates a pending record for `result`
    pub fn pending(
        session_id: Uuid,
        result: &ProcessingResult,
        origin: QuarantineOrigin,
        quarantined_path: impl Into<PathBuf>,
        sha256: impl Into<String>,
    ) -> Self {
        let (reason, detail) = match &result.failure {
            Some(failure) => (failure.code, failure.detail.clone()),
            None => (ReasonCode::Io, Some("quarantined without a failure reason".to_string())),
        };
        Self {
            id: Uuid::new_v4(),
            session_id,
            source_path: result.source_path.clone(),
            original_output: result.output_path.clone(),
            quarantined_path: quarantined_path.into(),
            origin,
            outcome: result.outcome,
            reason,
            detail,
            sha256: sha256.into(),
            state: QuarantineState::Pending,
            quarantined_at: Utc::now(),
        }
    }

    /// Marks the move as finished
    pub fn complete(mut self) -> Self {
        self.state = QuarantineState::Complete;
        self
    }

    /// Whether the move finished
    pub fn is_complete(&self) -> bool {
        self.state == QuarantineState::Complete
    }

    /// Sidecar path for a quarantined file
    pub fn sidecar_path_for(quarantined_path: &Path) -> PathBuf {
        let mut name = quarantined_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(SIDECAR_SUFFIX);
        quarantined_path.with_file_name(name)
    }

    /// This record's sidecar path
    pub fn sidecar_path(&self) -> PathBuf {
        Self::sidecar_path_for(&self.quarantined_path)
    }
}
