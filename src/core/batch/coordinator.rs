//! Batch coordinator - main orchestrator for an anonymization run
//!
//! Start-up happens before any input is touched: rules are compiled, the
//! audit key is loaded or created, directories are prepared and interrupted
//! quarantine moves are recovered. Each file then flows through
//! engine → validator → quarantine (on failure) → audit.

use crate::adapters::engine::{self, AnonymizationEngine};
use crate::anonymization::audit::{AuditEvent, AuditLogger, FileAuditEntry, SessionSummaryEntry};
use crate::anonymization::rules::{write_script, RuleSet};
use crate::config::{DeidConfig, EngineKind};
use crate::core::anonymize::{release_staged, EngineAdapter};
use crate::core::batch::session::Session;
use crate::core::batch::summary::{BatchReport, FileLine};
use crate::core::quarantine::QuarantineManager;
use crate::core::verification::checksum::calculate_checksum_file;
use crate::core::verification::Validator;
use crate::domain::{DeidError, FailureReason, ProcessingResult, ReasonCode, Result};
use crate::security::KeyManager;
use futures::StreamExt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;

/// Batch coordinator
pub struct BatchCoordinator {
    config: DeidConfig,
    session: Session,
    adapter: Arc<EngineAdapter>,
    pipeline: Arc<FilePipeline>,
}

impl BatchCoordinator {
    /// Create a coordinator using the configured engine
    ///
    /// # Errors
    ///
    /// - [`DeidError::Configuration`] for invalid configuration or unresolvable tags
    /// - [`DeidError::KeyUnavailable`] / [`DeidError::KeyCorrupt`] for key problems
    /// - [`DeidError::AuditWrite`] if the audit log cannot be opened
    pub fn new(config: DeidConfig) -> Result<Self> {
        let rules = compile_rules(&config)?;
        let engine = engine::from_config(&config.engine, Arc::clone(&rules))?;
        Self::start(config, rules, engine)
    }

    /// Create a coordinator around a caller-supplied engine
    ///
    /// # Errors
    ///
    /// Same as [`BatchCoordinator::new`]
    pub fn with_engine(config: DeidConfig, engine: Arc<dyn AnonymizationEngine>) -> Result<Self> {
        let rules = compile_rules(&config)?;
        Self::start(config, rules, engine)
    }

    fn start(
        config: DeidConfig,
        rules: Arc<RuleSet>,
        engine: Arc<dyn AnonymizationEngine>,
    ) -> Result<Self> {
        let dirs = &config.directories;
        if !dirs.input.is_dir() {
            return Err(DeidError::Configuration(format!(
                "input directory {} does not exist",
                dirs.input.display()
            )));
        }

        if config.engine.kind == EngineKind::External {
            write_script(&rules, &config.engine.script_path)?;
            tracing::info!(
                script = %config.engine.script_path.display(),
                "Rule script written"
            );
        }

        let key = KeyManager::from_config(&config.security).load_or_create()?;
        let session = Session::start(rules, &key);

        ensure_dir(&dirs.output, config.security.dir_permissions)?;

        let quarantine = QuarantineManager::new(
            &dirs.quarantine,
            session.id,
            config.security.file_permissions,
            config.security.dir_permissions,
        )?;
        let recovery = quarantine.recover()?;
        if !recovery.completed.is_empty() || !recovery.unresolved.is_empty() {
            tracing::warn!(
                completed = recovery.completed.len(),
                unresolved = recovery.unresolved.len(),
                "Recovered interrupted quarantine moves"
            );
        }
        // after recovery, which may still move a staged file into quarantine
        EngineAdapter::clean_staging(&dirs.output)?;

        let audit = AuditLogger::open(
            &dirs.audit,
            session.id,
            session.cipher.clone(),
            config.security.dir_permissions,
        )?;

        let abort = Arc::new(AtomicBool::new(false));
        let adapter = Arc::new(
            EngineAdapter::new(
                engine,
                &config.engine.script_path,
                config.security.file_permissions,
                config.application.workers,
            )
            .with_abort_flag(Arc::clone(&abort)),
        );

        let pipeline = Arc::new(FilePipeline {
            validator: Validator::new(
                config.validation,
                config.security.file_permissions,
                Arc::clone(&session.rules),
            ),
            quarantine,
            audit,
            fingerprint: session.fingerprint(),
            abort,
            fatal: Mutex::new(None),
        });

        Ok(Self {
            config,
            session,
            adapter,
            pipeline,
        })
    }

    /// Session of this coordinator
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Audit log written by this coordinator
    pub fn audit_log_path(&self) -> &Path {
        self.pipeline.audit.path()
    }

    /// Runs the batch
    ///
    /// A shutdown signal or a fatal error stops new files from starting;
    /// files already in flight finish to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error ([`DeidError::AuditWrite`] or
    /// [`DeidError::Quarantine`]) after the in-flight files have settled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<BatchReport> {
        let start_time = Instant::now();

        let abort = self.adapter.abort_flag();
        if *shutdown.borrow_and_update() {
            tracing::info!("Shutdown already requested; no files will be started");
            abort.store(true, Ordering::SeqCst);
        }
        let watcher = tokio::spawn(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    tracing::info!("Shutdown requested; no new files will be started");
                    abort.store(true, Ordering::SeqCst);
                    break;
                }
            }
        });

        let pipeline = Arc::clone(&self.pipeline);
        let run = self.adapter.process_with(
            &self.config.directories.input,
            &self.config.directories.output,
            move |result| {
                let pipeline = Arc::clone(&pipeline);
                async move {
                    let source = result.source_path.clone();
                    let settle = Arc::clone(&pipeline);
                    match tokio::task::spawn_blocking(move || settle.settle(result)).await {
                        Ok(settled) => settled,
                        Err(e) => pipeline.fail_join(source, e),
                    }
                }
            },
        )?;

        let total = run.total();
        let files: Vec<FileLine> = run.map(|result| FileLine::from(&result)).collect().await;
        watcher.abort();

        let report =
            BatchReport::new(self.session.id, total, files).with_duration(start_time.elapsed());
        report.log_summary();

        if let Some(error) = self.pipeline.take_fatal() {
            tracing::error!(error = %error, "Batch aborted");
            return Err(error);
        }

        self.pipeline.audit.append(&AuditEvent::SessionSummary(SessionSummaryEntry {
            total: report.total,
            succeeded: report.succeeded,
            failed: report.failed,
            skipped: report.skipped,
            rules_fingerprint: self.session.fingerprint(),
            duration_ms: report.duration.as_millis() as u64,
        }))?;

        Ok(report)
    }
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("session_id", &self.session.id)
            .field("adapter", &self.adapter)
            .finish()
    }
}

/// Validator, quarantine and audit for one file
struct FilePipeline {
    validator: Validator,
    quarantine: QuarantineManager,
    audit: AuditLogger,
    fingerprint: String,
    abort: Arc<AtomicBool>,
    fatal: Mutex<Option<DeidError>>,
}

impl FilePipeline {
    /// Brings an engine result to its terminal, audited state
    ///
    /// The staged output takes its final name only after validation passed.
    fn settle(&self, result: ProcessingResult) -> ProcessingResult {
        let result = release_staged(self.validator.validate(result));

        let (result, entry) = if result.is_success() {
            self.release(result)
        } else {
            self.isolate(result)
        };

        match self.audit.record(entry) {
            Ok(sequence) => {
                tracing::info!(
                    file = %result.file_name(),
                    outcome = %result.outcome,
                    sequence,
                    "File processed"
                );
                result
            }
            Err(e) => self.on_audit_failure(result, e),
        }
    }

    fn release(&self, result: ProcessingResult) -> (ProcessingResult, FileAuditEntry) {
        let checksum = result
            .output_path
            .as_deref()
            .ok_or_else(|| "no output file recorded".to_string())
            .and_then(|output| calculate_checksum_file(output).map_err(|e| e.to_string()));

        match checksum {
            Ok(sha256) => {
                let entry = FileAuditEntry::from_result(&result, &self.fingerprint).with_sha256(sha256);
                (result, entry)
            }
            Err(e) => self.isolate(result.into_error(FailureReason::with_detail(ReasonCode::Io, e))),
        }
    }

    fn isolate(&self, result: ProcessingResult) -> (ProcessingResult, FileAuditEntry) {
        match self.quarantine.quarantine(&result) {
            Ok(record) => {
                let entry = FileAuditEntry::from_result(&result, &self.fingerprint)
                    .with_quarantine_path(&record.quarantined_path)
                    .with_sha256(&record.sha256);
                (result, entry)
            }
            Err(e) => {
                // An unquarantined output must never stay releasable
                withdraw(&result);
                tracing::error!(file = %result.file_name(), error = %e, "Quarantine failed");
                let detail = e.to_string();
                self.raise(e);

                let result = if result.failure.is_some() {
                    result
                } else {
                    result.into_error(FailureReason::with_detail(ReasonCode::Io, detail))
                };
                let entry = FileAuditEntry::from_result(&result, &self.fingerprint);
                (result, entry)
            }
        }
    }

    fn on_audit_failure(&self, result: ProcessingResult, error: DeidError) -> ProcessingResult {
        tracing::error!(file = %result.file_name(), error = %error, "Audit write failed");
        let reason = FailureReason::with_detail(ReasonCode::AuditWrite, error.to_string());

        let result = if result.is_success() {
            // never release a file without its audit record
            let result = result.into_error(reason);
            if let Err(e) = self.quarantine.quarantine(&result) {
                tracing::error!(file = %result.file_name(), error = %e, "Quarantine failed");
                withdraw(&result);
            }
            result
        } else {
            result.into_error(reason)
        };

        self.raise(error);
        result
    }

    fn fail_join(&self, source: std::path::PathBuf, error: tokio::task::JoinError) -> ProcessingResult {
        tracing::error!(file = %source.display(), error = %error, "File pipeline task failed");
        self.raise(DeidError::Other(format!("file pipeline task failed: {error}")));
        ProcessingResult::error(
            source,
            FailureReason::with_detail(ReasonCode::Io, error.to_string()),
        )
    }

    /// Records the first fatal error and stops new files from starting
    fn raise(&self, error: DeidError) {
        self.abort.store(true, Ordering::SeqCst);
        if let Ok(mut fatal) = self.fatal.lock() {
            fatal.get_or_insert(error);
        }
    }

    fn take_fatal(&self) -> Option<DeidError> {
        self.fatal.lock().ok().and_then(|mut fatal| fatal.take())
    }
}

/// Deletes the output behind a result that could not be quarantined
fn withdraw(result: &ProcessingResult) {
    let Some(output) = result.output_path.as_deref() else {
        return;
    };
    match fs::remove_file(output) {
        Ok(()) => tracing::warn!(output = %output.display(), "Withdrew unquarantined output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!(
            output = %output.display(),
            error = %e,
            "Failed to withdraw unquarantined output"
        ),
    }
}

fn compile_rules(config: &DeidConfig) -> Result<Arc<RuleSet>> {
    config.validate().map_err(DeidError::Configuration)?;
    Ok(Arc::new(RuleSet::compile(&config.anonymization)?))
}

fn ensure_dir(dir: &Path, dir_permissions: u32) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(dir_permissions))?;
    }
    #[cfg(not(unix))]
    let _ = dir_permissions;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::engine::EngineStatus;
    use crate::anonymization::audit::AuditReader;
    use crate::domain::Outcome;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct NullEngine;

    #[async_trait]
    impl AnonymizationEngine for NullEngine {
        fn name(&self) -> &str {
            "null"
        }

        async fn invoke(&self, _script: &Path, _input: &Path, _staging: &Path) -> EngineStatus {
            EngineStatus::LaunchFailed("null engine".to_string())
        }
    }

    fn config(root: &Path) -> DeidConfig {
        let mut config = DeidConfig::default();
        config.directories.input = root.join("raw");
        config.directories.output = root.join("anonymized");
        config.directories.quarantine = root.join("quarantine");
        config.directories.logs = root.join("logs");
        config.directories.audit = root.join("audit");
        config.security.encryption_key_path = root.join("config/encryption.key");
        config.application.workers = 2;
        config
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[test]
    fn test_withdraw_removes_unquarantined_output() {
        let root = tempfile::tempdir().unwrap();
        let output = root.path().join("a.dcm");
        fs::write(&output, b"validated").unwrap();
        let result = ProcessingResult::success(root.path().join("in/a.dcm"), &output)
            .into_error(FailureReason::new(ReasonCode::AuditWrite));

        withdraw(&result);
        assert!(!output.exists());
        // already gone, or never produced: nothing to do
        withdraw(&result);
        withdraw(&ProcessingResult::error("in/b.dcm", FailureReason::new(ReasonCode::Io)));
    }

    #[test]
    fn test_missing_input_dir_is_configuration_error() {
        let root = tempfile::tempdir().unwrap();
        let err = BatchCoordinator::with_engine(config(root.path()), Arc::new(NullEngine)).unwrap_err();
        assert!(matches!(err, DeidError::Configuration(_)));
    }

    #[test]
    fn test_unknown_keyword_aborts_before_key_creation() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(root.path());
        fs::create_dir_all(&config.directories.input).unwrap();
        config.anonymization.hipaa_tags.push("NotAKeyword".to_string());

        let err = BatchCoordinator::with_engine(config.clone(), Arc::new(NullEngine)).unwrap_err();
        assert!(matches!(err, DeidError::Configuration(_)));
        assert!(!config.security.encryption_key_path.exists());
    }

    #[tokio::test]
    async fn test_empty_batch_is_invalid_and_summarized() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        fs::create_dir_all(&config.directories.input).unwrap();

        let coordinator = BatchCoordinator::with_engine(config.clone(), Arc::new(NullEngine)).unwrap();
        let report = coordinator.run(no_shutdown()).await.unwrap();
        assert_eq!(report.total, 0);
        assert!(!report.is_valid());

        let key = KeyManager::from_config(&config.security).load().unwrap();
        let verification = AuditReader::new(crate::security::AuditCipher::new(&key))
            .verify(coordinator.audit_log_path())
            .unwrap();
        assert!(verification.is_intact());
        assert!(matches!(
            verification.records[0].event,
            AuditEvent::SessionSummary(_)
        ));
    }

    #[tokio::test]
    async fn test_engine_failures_quarantine_source_copies() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        fs::create_dir_all(&config.directories.input).unwrap();
        let input: PathBuf = config.directories.input.join("x.dcm");
        fs::write(&input, b"raw").unwrap();

        let coordinator = BatchCoordinator::with_engine(config.clone(), Arc::new(NullEngine)).unwrap();
        let report = coordinator.run(no_shutdown()).await.unwrap();

        assert_eq!(report.files[0].outcome, Outcome::QuarantinedEngineFailure);
        assert_eq!(report.files[0].reason, Some(ReasonCode::EngineLaunch));
        assert!(input.exists());
        assert!(config.directories.quarantine.join("x.dcm").exists());
        assert!(!config.directories.output.join("x.dcm").exists());
    }
}
