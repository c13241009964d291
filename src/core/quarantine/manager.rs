//! Filesystem quarantine
//!
//! ```text
//! quarantine/
//! ├── b.dcm                      # quarantined file
//! └── b.dcm.quarantine.json      # sidecar: reason, checksum, state
//! ```
//!
//! The sidecar is written `pending` before the file moves and rewritten
//! `complete` after, so [`QuarantineManager::recover`] can finish a move
//! that a crash interrupted.

use super::record::{QuarantineOrigin, QuarantineRecord, SIDECAR_SUFFIX};
use crate::core::verification::checksum::calculate_checksum_file;
use crate::domain::{DeidError, ProcessingResult, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What [`QuarantineManager::recover`] did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Interrupted moves that were finished
    pub completed: Vec<PathBuf>,
    /// Pending records that could not be resolved
    pub unresolved: Vec<PathBuf>,
}

/// Moves failed files into the quarantine directory
#[derive(Debug, Clone)]
pub struct QuarantineManager {
    dir: PathBuf,
    session_id: Uuid,
    file_permissions: u32,
}

impl QuarantineManager {
    /// Creates the manager, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::Quarantine`] if the directory cannot be created
    pub fn new(
        dir: impl Into<PathBuf>,
        session_id: Uuid,
        file_permissions: u32,
        dir_permissions: u32,
    ) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                DeidError::Quarantine(format!(
                    "Failed to create quarantine directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            set_mode(&dir, dir_permissions)?;
        }
        Ok(Self {
            dir,
            session_id,
            file_permissions,
        })
    }

    /// Quarantine directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Quarantines the file behind a non-success result
    ///
    /// An existing engine output is moved; otherwise the input is copied so
    /// the input directory stays untouched. A staged output is quarantined
    /// under its final name.
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::Quarantine`] if the file cannot be placed in
    /// quarantine and verified
    pub fn quarantine(&self, result: &ProcessingResult) -> Result<QuarantineRecord> {
        let (origin, from, named) = match result.output_path.as_deref() {
            Some(output) if output.exists() => (
                QuarantineOrigin::Output,
                output.to_path_buf(),
                result.output_name().unwrap_or(output).to_path_buf(),
            ),
            _ => (
                QuarantineOrigin::Source,
                result.source_path.clone(),
                result.source_path.clone(),
            ),
        };

        let sha256 = calculate_checksum_file(&from).map_err(|e| {
            DeidError::Quarantine(format!("Failed to hash {}: {}", from.display(), e))
        })?;

        let target = self.free_target(&named)?;
        let record = QuarantineRecord::pending(self.session_id, result, origin, &target, sha256);
        self.write_sidecar(&record)?;

        self.place(&record, &from)?;

        let record = record.complete();
        self.write_sidecar(&record)?;

        tracing::warn!(
            file = %result.file_name(),
            quarantined_path = %record.quarantined_path.display(),
            origin = ?record.origin,
            reason = %record.reason,
            "File quarantined"
        );

        Ok(record)
    }

    /// Finishes any move left `pending` by an earlier crash
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::Quarantine`] if the directory cannot be listed
    pub fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for record in self.list()? {
            if record.is_complete() {
                continue;
            }

            let outcome = self.finish_pending(&record);
            match outcome {
                Ok(()) => {
                    self.write_sidecar(&record.clone().complete())?;
                    tracing::info!(
                        quarantined_path = %record.quarantined_path.display(),
                        "Recovered interrupted quarantine"
                    );
                    report.completed.push(record.quarantined_path);
                }
                Err(e) => {
                    tracing::error!(
                        quarantined_path = %record.quarantined_path.display(),
                        error = %e,
                        "Cannot recover interrupted quarantine"
                    );
                    report.unresolved.push(record.quarantined_path);
                }
            }
        }

        Ok(report)
    }

    /// Reads every sidecar in the quarantine directory
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::Quarantine`] if the directory cannot be listed
    pub fn list(&self) -> Result<Vec<QuarantineRecord>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            DeidError::Quarantine(format!("Failed to read {}: {}", self.dir.display(), e))
        })?;

        let mut records = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_sidecar = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SIDECAR_SUFFIX));
            if !is_sidecar {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str::<QuarantineRecord>(&c).map_err(|e| e.to_string()))
            {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(sidecar = %path.display(), error = %e, "Unreadable quarantine sidecar"),
            }
        }

        records.sort_by(|a, b| a.quarantined_path.cmp(&b.quarantined_path));
        Ok(records)
    }

    fn finish_pending(&self, record: &QuarantineRecord) -> Result<()> {
        let target = &record.quarantined_path;
        if target.exists() {
            if calculate_checksum_file(target)? == record.sha256 {
                // Copy finished; only the source deletion may be missing.
                if record.origin == QuarantineOrigin::Output {
                    if let Some(output) = &record.original_output {
                        remove_if_exists(output)?;
                    }
                }
                return Ok(());
            }
            fs::remove_file(target)?;
        }

        let from = match record.origin {
            QuarantineOrigin::Output => record.original_output.clone(),
            QuarantineOrigin::Source => Some(record.source_path.clone()),
        }
        .filter(|p| p.exists())
        .ok_or_else(|| {
            DeidError::Quarantine(format!(
                "neither {} nor its origin exists",
                target.display()
            ))
        })?;

        self.place(record, &from)
    }

    /// Moves (Output) or copies (Source) `from` to the record's target
    fn place(&self, record: &QuarantineRecord, from: &Path) -> Result<()> {
        let target = &record.quarantined_path;
        match record.origin {
            QuarantineOrigin::Output => {
                if fs::rename(from, target).is_err() {
                    // rename fails across volumes
                    copy_verified(from, target, &record.sha256)?;
                    fs::remove_file(from).map_err(|e| {
                        DeidError::Quarantine(format!(
                            "Copied but could not remove {}: {}",
                            from.display(),
                            e
                        ))
                    })?;
                }
            }
            QuarantineOrigin::Source => copy_verified(from, target, &record.sha256)?,
        }
        set_file_mode(target, self.file_permissions)?;
        sync_dir(&self.dir);
        Ok(())
    }

    fn free_target(&self, named: &Path) -> Result<PathBuf> {
        let name = named
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DeidError::Quarantine(format!("{} has no file name", named.display())))?;

        let candidate = self.dir.join(&name);
        if is_free(&candidate) {
            return Ok(candidate);
        }

        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let ext = Path::new(&name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        loop {
            let suffix = &Uuid::new_v4().simple().to_string()[..8];
            let candidate = self.dir.join(format!("{stem}.{suffix}{ext}"));
            if is_free(&candidate) {
                return Ok(candidate);
            }
        }
    }

    fn write_sidecar(&self, record: &QuarantineRecord) -> Result<()> {
        let path = record.sidecar_path();
        let content = serde_json::to_string_pretty(record).map_err(|e| {
            DeidError::Quarantine(format!("Failed to serialize quarantine metadata: {}", e))
        })?;

        let write = || -> std::io::Result<()> {
            let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
            temp.write_all(content.as_bytes())?;
            temp.as_file().sync_all()?;
            temp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| {
            DeidError::Quarantine(format!(
                "Failed to write quarantine metadata {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(sidecar = %path.display(), state = ?record.state, "Quarantine sidecar written");
        Ok(())
    }
}

fn is_free(candidate: &Path) -> bool {
    !candidate.exists() && !QuarantineRecord::sidecar_path_for(candidate).exists()
}

fn copy_verified(from: &Path, to: &Path, expected_sha256: &str) -> Result<()> {
    fs::copy(from, to).map_err(|e| {
        DeidError::Quarantine(format!(
            "Failed to copy {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })?;
    fs::File::open(to)
        .and_then(|f| f.sync_all())
        .map_err(|e| DeidError::Quarantine(format!("Failed to sync {}: {}", to.display(), e)))?;

    let actual = calculate_checksum_file(to)?;
    if actual != expected_sha256 {
        let _ = fs::remove_file(to);
        return Err(DeidError::Quarantine(format!(
            "Checksum mismatch after copying {}: expected {}, got {}",
            from.display(),
            expected_sha256,
            actual
        )));
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        DeidError::Quarantine(format!(
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

fn set_file_mode(path: &Path, mode: u32) -> Result<()> {
    set_mode(path, mode)
}
