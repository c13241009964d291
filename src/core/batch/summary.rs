//! Batch summary and reporting
//!
//! Full [`ProcessingResult`]s are dropped once audited; only a
//! [`FileLine`] per file survives into the [`BatchReport`].

use crate::domain::{Outcome, ProcessingResult, ReasonCode};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// What the batch report keeps of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLine {
    /// Input file name
    pub file: String,

    /// Terminal outcome
    pub outcome: Outcome,

    /// Failure category for non-success outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl From<&ProcessingResult> for FileLine {
    fn from(result: &ProcessingResult) -> Self {
        Self {
            file: result.file_name(),
            outcome: result.outcome,
            reason: result.failure.as_ref().map(|f| f.code),
        }
    }
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Session that processed the batch
    pub session_id: Uuid,

    /// Files enumerated in the input directory
    pub total: usize,

    /// Files released
    pub succeeded: usize,

    /// Files quarantined or in error
    pub failed: usize,

    /// Files left in the input directory after an abort
    pub skipped: usize,

    /// Per-file lines, in input order
    pub files: Vec<FileLine>,

    /// Wall-clock duration
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl BatchReport {
    /// Builds a report from the per-file lines of a run
    pub fn new(session_id: Uuid, total: usize, files: Vec<FileLine>) -> Self {
        let succeeded = files.iter().filter(|f| f.outcome.is_success()).count();
        let failed = files.len() - succeeded;
        Self {
            session_id,
            total,
            succeeded,
            failed,
            skipped: total.saturating_sub(files.len()),
            files,
            duration: Duration::from_secs(0),
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// True only if every file was released; an empty batch is invalid
    pub fn is_valid(&self) -> bool {
        self.total > 0 && self.succeeded == self.total
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            session_id = %self.session_id,
            total = self.total,
            succeeded = self.succeeded,
            failed = self.failed,
            skipped = self.skipped,
            duration_ms = self.duration.as_millis() as u64,
            valid = self.is_valid(),
            "Batch completed"
        );

        if self.total == 0 {
            tracing::warn!("No input files found; an empty batch is not valid");
        }

        for line in self.files.iter().filter(|l| !l.outcome.is_success()) {
            tracing::warn!(
                file = %line.file,
                outcome = %line.outcome,
                reason = line.reason.map(|r| r.as_str()).unwrap_or(""),
                "File not released"
            );
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
