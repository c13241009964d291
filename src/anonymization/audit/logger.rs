//! Encrypted, append-only audit logger

use super::record::{AuditEvent, AuditHeader, AuditLine, FileAuditEntry};
use crate::domain::{DeidError, Result};
use crate::security::AuditCipher;
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// File name of the audit log inside the audit directory
pub const AUDIT_LOG_FILE: &str = "audit.log";

struct WriterState {
    file: File,
    next_sequence: u64,
}

/// Appends encrypted audit records for one session
///
/// Sequence numbers are assigned and written under a single lock, so the
/// records of a session are gap-free and in file order. Every write also
/// holds an exclusive lock on the file itself, since other sessions may be
/// appending to the same log. A failed write truncates its own partial
/// line and does not consume a number.
pub struct AuditLogger {
    path: PathBuf,
    session_id: Uuid,
    cipher: AuditCipher,
    state: Mutex<WriterState>,
}

impl AuditLogger {
    /// Opens (creating if needed) `<audit_dir>/audit.log` for appending
    ///
    /// # Arguments
    ///
    /// * `audit_dir` - Audit directory, created with `dir_permissions`
    /// * `session_id` - Session the records belong to
    /// * `cipher` - Cipher over the session key
    /// * `dir_permissions` - Mode for a newly created directory
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::AuditWrite`] if the log cannot be opened
    pub fn open(
        audit_dir: &Path,
        session_id: Uuid,
        cipher: AuditCipher,
        dir_permissions: u32,
    ) -> Result<Self> {
        if !audit_dir.exists() {
            fs::create_dir_all(audit_dir).map_err(|e| {
                DeidError::AuditWrite(format!(
                    "Failed to create audit directory {}: {}",
                    audit_dir.display(),
                    e
                ))
            })?;
            set_mode(audit_dir, dir_permissions)?;
        }

        let path = audit_dir.join(AUDIT_LOG_FILE);
        let file = open_log(&path).map_err(|e| {
            DeidError::AuditWrite(format!("Failed to open audit log {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            session_id = %session_id,
            "Audit log opened"
        );

        Ok(Self {
            path,
            session_id,
            cipher,
            state: Mutex::new(WriterState {
                file,
                next_sequence: 1,
            }),
        })
    }

    /// Audit log path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session the records belong to
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Number of records written so far in this session
    pub fn records_written(&self) -> u64 {
        self.state
            .lock()
            .map(|s| s.next_sequence - 1)
            .unwrap_or(0)
    }

    /// Records the terminal state of one file
    ///
    /// Returns the sequence number assigned to the record.
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::AuditWrite`] if the record was not durably written
    pub fn record(&self, entry: FileAuditEntry) -> Result<u64> {
        self.append(&AuditEvent::File(entry))
    }

    /// Appends a record correcting an earlier one
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::AuditWrite`] if the record was not durably written
    pub fn record_compensation(&self, sequence: u64, reason: impl Into<String>) -> Result<u64> {
        self.append(&AuditEvent::Compensation {
            compensates: sequence,
            reason: reason.into(),
        })
    }

    /// Appends any event
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::AuditWrite`] if the record was not durably written
    pub fn append(&self, event: &AuditEvent) -> Result<u64> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| DeidError::AuditWrite(format!("Failed to serialize audit event: {e}")))?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| DeidError::AuditWrite("audit writer lock poisoned".to_string()))?;

        let sequence = state.next_sequence;
        let header = AuditHeader::new(sequence, self.session_id, Utc::now());
        let aad = header
            .aad()
            .map_err(|e| DeidError::AuditWrite(format!("Failed to serialize audit header: {e}")))?;
        let sealed = self.cipher.seal(&aad, &payload)?;

        let line = AuditLine {
            header,
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
        };
        let mut bytes = serde_json::to_vec(&line)
            .map_err(|e| DeidError::AuditWrite(format!("Failed to serialize audit line: {e}")))?;
        bytes.push(b'\n');

        if let Err(e) = append_line(&mut state.file, &bytes, write_durably) {
            tracing::error!(
                path = %self.path.display(),
                sequence,
                error = %e,
                "Audit write failed"
            );
            return Err(DeidError::AuditWrite(format!(
                "Failed to write audit record {} to {}: {}",
                sequence,
                self.path.display(),
                e
            )));
        }

        state.next_sequence += 1;
        tracing::debug!(sequence, session_id = %self.session_id, "Audit record written");
        Ok(sequence)
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("path", &self.path)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Appends one line under an exclusive file lock
///
/// The truncation point is the file length measured under the lock, so a
/// failed write only ever removes its own partial line.
fn append_line(
    file: &mut File,
    line: &[u8],
    write: impl FnOnce(&mut File, &[u8]) -> std::io::Result<()>,
) -> std::io::Result<()> {
    file.lock()?;
    let written = match file.metadata() {
        Ok(meta) => {
            let start = meta.len();
            let written = write(&mut *file, line);
            if written.is_err() {
                if let Err(e) = file.set_len(start) {
                    tracing::error!(error = %e, "Failed to truncate partial audit record");
                }
            }
            written
        }
        Err(e) => Err(e),
    };
    if let Err(e) = file.unlock() {
        tracing::warn!(error = %e, "Failed to unlock audit log");
    }
    written
}

fn write_durably(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line)?;
    file.sync_data()
}

#[cfg(unix)]
fn open_log(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_log(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        DeidError::AuditWrite(format!(
            "Failed to set permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
