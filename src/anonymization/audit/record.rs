//! Audit record types
//!
//! On disk every record is one JSON line:
//!
//! ```text
//! {"header":{"sequence":1,"session_id":"…","timestamp":"…"},"nonce":"…","ciphertext":"…"}
//! ```
//!
//! The header stays readable so ordering can be checked without the key;
//! everything about the file itself lives in the encrypted [`AuditEvent`].

use crate::domain::{FailureReason, Outcome, ProcessingResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Plaintext record header, authenticated as AES-GCM associated data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditHeader {
    /// Per-session sequence number, starting at 1
    pub sequence: u64,

    /// Session that wrote the record
    pub session_id: Uuid,

    /// RFC 3339 write time
    pub timestamp: String,
}

impl AuditHeader {
    pub(crate) fn new(sequence: u64, session_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            sequence,
            session_id,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    /// Associated-data bytes
    pub(crate) fn aad(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// One line of `audit.log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLine {
    /// Plaintext header
    pub header: AuditHeader,

    /// Base64 nonce
    pub nonce: String,

    /// Base64 ciphertext of the serialized [`AuditEvent`]
    pub ciphertext: String,
}

/// Encrypted payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Terminal state of one input file
    File(FileAuditEntry),

    /// Corrects an earlier record, which is never rewritten
    Compensation {
        /// Sequence number of the record being corrected
        compensates: u64,
        /// Why
        reason: String,
    },

    /// Totals written when a session ends
    SessionSummary(SessionSummaryEntry),
}

/// Audit payload for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAuditEntry {
    /// Input file
    pub source_path: PathBuf,

    /// Where the anonymized file was released, for successes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Where the file was quarantined, for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_path: Option<PathBuf>,

    /// Terminal outcome
    pub outcome: Outcome,

    /// Failure reason, for non-success outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,

    /// SHA-256 of the released or quarantined file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Fingerprint of the rule set the file was processed with
    pub rules_fingerprint: String,

    /// When the outcome was decided
    pub processed_at: DateTime<Utc>,
}

impl FileAuditEntry {
    /// Builds an entry from a terminal processing result
    pub fn from_result(result: &ProcessingResult, rules_fingerprint: impl Into<String>) -> Self {
        let released = result.outcome.is_success();
        Self {
            source_path: result.source_path.clone(),
            output_path: if released { result.output_path.clone() } else { None },
            quarantine_path: None,
            outcome: result.outcome,
            failure: result.failure.clone(),
            sha256: None,
            rules_fingerprint: rules_fingerprint.into(),
            processed_at: result.timestamp,
        }
    }

    /// Records the quarantine location
    pub fn with_quarantine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.quarantine_path = Some(path.into());
        self
    }

    /// Records the file checksum
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }
}

/// Session totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummaryEntry {
    /// Files enumerated
    pub total: usize,
    /// Files released
    pub succeeded: usize,
    /// Files quarantined or in error
    pub failed: usize,
    /// Files left untouched after an abort
    pub skipped: usize,
    /// Fingerprint of the session rule set
    pub rules_fingerprint: String,
    /// Session duration
    pub duration_ms: u64,
}
