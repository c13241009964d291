//! Audit log verification

use super::record::{AuditEvent, AuditHeader, AuditLine};
use crate::domain::{DeidError, Result};
use crate::security::{AuditCipher, Sealed};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use uuid::Uuid;

/// A decrypted, authenticated record
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedRecord {
    /// Plaintext header
    pub header: AuditHeader,
    /// Decrypted payload
    pub event: AuditEvent,
}

/// A problem found while verifying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationIssue {
    /// 1-based line number in the log
    pub line: usize,
    /// What is wrong
    pub message: String,
}

impl std::fmt::Display for VerificationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Result of verifying an audit log
#[derive(Debug, Default)]
pub struct AuditVerification {
    /// Records that decrypted and authenticated
    pub records: Vec<VerifiedRecord>,
    /// Records per session, in order of first appearance
    pub sessions: Vec<(Uuid, u64)>,
    /// Everything that failed
    pub issues: Vec<VerificationIssue>,
}

impl AuditVerification {
    /// Whether every record authenticated and every session is gap-free
    pub fn is_intact(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Decrypts and checks an audit log
#[derive(Debug, Clone)]
pub struct AuditReader {
    cipher: AuditCipher,
}

impl AuditReader {
    /// Creates a reader with the audit key's cipher
    pub fn new(cipher: AuditCipher) -> Self {
        Self { cipher }
    }

    /// Verifies every record in `path`
    ///
    /// Each record's tag must verify against its header, and each session's
    /// sequence numbers must run 1, 2, 3, … without gaps or repeats.
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::AuditVerify`] only if the log cannot be read at
    /// all; per-record problems are reported as issues
    pub fn verify(&self, path: &Path) -> Result<AuditVerification> {
        let file = File::open(path).map_err(|e| {
            DeidError::AuditVerify(format!("Failed to open audit log {}: {}", path.display(), e))
        })?;

        let mut report = AuditVerification::default();
        let mut expected: BTreeMap<Uuid, u64> = BTreeMap::new();
        let mut session_index: BTreeMap<Uuid, usize> = BTreeMap::new();

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| {
                DeidError::AuditVerify(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let mut issue = |message: String| {
                report.issues.push(VerificationIssue {
                    line: line_no,
                    message,
                })
            };

            let parsed: AuditLine = match serde_json::from_str(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    issue(format!("malformed record: {e}"));
                    continue;
                }
            };

            let header = parsed.header;
            let next = expected.entry(header.session_id).or_insert(1);
            if header.sequence != *next {
                issue(format!(
                    "session {} expected sequence {}, found {}",
                    header.session_id, next, header.sequence
                ));
            }
            *next = header.sequence + 1;

            let event = match self.open(&header, parsed.nonce, parsed.ciphertext) {
                Ok(event) => event,
                Err(e) => {
                    issue(format!("sequence {}: {}", header.sequence, e));
                    continue;
                }
            };

            let slot = *session_index.entry(header.session_id).or_insert_with(|| {
                report.sessions.push((header.session_id, 0));
                report.sessions.len() - 1
            });
            report.sessions[slot].1 += 1;
            report.records.push(VerifiedRecord { header, event });
        }

        tracing::info!(
            path = %path.display(),
            records = report.records.len(),
            sessions = report.sessions.len(),
            issues = report.issues.len(),
            "Audit log verified"
        );

        Ok(report)
    }

    fn open(&self, header: &AuditHeader, nonce: String, ciphertext: String) -> Result<AuditEvent> {
        let aad = header
            .aad()
            .map_err(|e| DeidError::AuditVerify(format!("cannot encode header: {e}")))?;
        let plaintext = self.cipher.open(&aad, &Sealed { nonce, ciphertext })?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| DeidError::AuditVerify(format!("undecodable payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymization::audit::logger::AuditLogger;
    use crate::anonymization::audit::record::FileAuditEntry;
    use crate::domain::ProcessingResult;
    use crate::security::{EncryptionKey, KEY_LEN};
    use std::fs;
    use tempfile::tempdir;

    fn cipher(byte: u8) -> AuditCipher {
        AuditCipher::new(&EncryptionKey::from_bytes([byte; KEY_LEN]))
    }

    fn write_log(dir: &Path, count: usize) -> std::path::PathBuf {
        let logger = AuditLogger::open(dir, Uuid::new_v4(), cipher(1), 0o700).unwrap();
        for i in 0..count {
            let result = ProcessingResult::success(format!("/in/{i}.dcm"), format!("/out/{i}.dcm"));
            logger.record(FileAuditEntry::from_result(&result, "fp")).unwrap();
        }
        logger.path().to_path_buf()
    }

    #[test]
    fn test_intact_log() {
        let dir = tempdir().unwrap();
        let path = write_log(dir.path(), 3);

        let report = AuditReader::new(cipher(1)).verify(&path).unwrap();
        assert!(report.is_intact(), "{:?}", report.issues);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.sessions.len(), 1);
        assert_eq!(report.sessions[0].1, 3);
        assert!(matches!(report.records[0].event, AuditEvent::File(_)));
    }

    #[test]
    fn test_wrong_key_reports_every_record() {
        let dir = tempdir().unwrap();
        let path = write_log(dir.path(), 2);

        let report = AuditReader::new(cipher(2)).verify(&path).unwrap();
        assert_eq!(report.issues.len(), 2);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_deleted_record_is_a_gap() {
        let dir = tempdir().unwrap();
        let path = write_log(dir.path(), 3);

        let contents = fs::read_to_string(&path).unwrap();
        let kept: Vec<_> = contents.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        fs::write(&path, kept.join("\n") + "\n").unwrap();

        let report = AuditReader::new(cipher(1)).verify(&path).unwrap();
        assert!(!report.is_intact());
        assert!(report.issues[0].message.contains("expected sequence 2, found 3"));
    }

    #[test]
    fn test_edited_header_fails_authentication() {
        let dir = tempdir().unwrap();
        let path = write_log(dir.path(), 1);

        let contents = fs::read_to_string(&path).unwrap();
        let mut line: AuditLine = serde_json::from_str(contents.trim()).unwrap();
        line.header.timestamp = "2020-01-01T00:00:00.000000Z".to_string();
        fs::write(&path, serde_json::to_string(&line).unwrap() + "\n").unwrap();

        let report = AuditReader::new(cipher(1)).verify(&path).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].message.contains("authentication failed"));
    }

    #[test]
    fn test_truncated_line_reported() {
        let dir = tempdir().unwrap();
        let path = write_log(dir.path(), 1);
        let mut contents = fs::read_to_string(&path).unwrap();
        contents.push_str("{\"header\":{\"seq");
        fs::write(&path, contents).unwrap();

        let report = AuditReader::new(cipher(1)).verify(&path).unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].line, 2);
    }
}
