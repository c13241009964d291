//! Engine adapter
//!
//! Maps each input file to its output name and invokes the engine on a
//! hidden staging path. The final name is claimed by [`release_staged`],
//! which callers run only after the staged file has been validated, so the
//! output directory never holds an unchecked file under a `.dcm` name.

use crate::adapters::engine::AnonymizationEngine;
use crate::domain::context::ResultExt;
use crate::domain::{FailureReason, ProcessingResult, ReasonCode, Result};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

const STAGING_SUFFIX: &str = ".staging";

/// Work planned for one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTask {
    /// Run the engine on `source`, releasing to `output`
    Anonymize {
        /// Input file
        source: PathBuf,
        /// Final output name
        output: PathBuf,
    },
    /// The output name is taken; the engine is not invoked
    Collision {
        /// Input file
        source: PathBuf,
        /// Output name that was already taken
        output: PathBuf,
        /// Taken by an existing file or by an earlier input
        detail: String,
    },
}

impl FileTask {
    /// Input file of this task
    pub fn source(&self) -> &Path {
        match self {
            FileTask::Anonymize { source, .. } | FileTask::Collision { source, .. } => source,
        }
    }
}

/// Lists `.dcm` inputs (case-insensitive), regular files only, sorted by name
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read
pub fn enumerate_inputs(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read input directory {}", input_dir.display()))?;

    let mut inputs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_dicom = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("dcm"));
        if is_dicom {
            inputs.push(path);
        }
    }

    inputs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(inputs)
}

/// Maps inputs to `output_dir/<stem>.dcm`, flagging names already taken
pub fn plan(inputs: Vec<PathBuf>, output_dir: &Path) -> Vec<FileTask> {
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    inputs
        .into_iter()
        .map(|source| {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = output_dir.join(format!("{stem}.dcm"));

            if fs::symlink_metadata(&output).is_ok() {
                FileTask::Collision {
                    source,
                    detail: format!("{} already exists", output.display()),
                    output,
                }
            } else if !claimed.insert(output.clone()) {
                FileTask::Collision {
                    source,
                    detail: format!("{} is claimed by an earlier input", output.display()),
                    output,
                }
            } else {
                FileTask::Anonymize { source, output }
            }
        })
        .collect()
}

/// Hidden staging path next to `output`, unique per invocation
pub fn staging_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(
        ".{stem}.{}{STAGING_SUFFIX}",
        uuid::Uuid::new_v4().simple()
    ))
}

/// Drives the engine over a batch
pub struct EngineAdapter {
    engine: Arc<dyn AnonymizationEngine>,
    script_path: PathBuf,
    file_permissions: u32,
    workers: usize,
    abort: Arc<AtomicBool>,
}

impl EngineAdapter {
    /// Create a new adapter
    ///
    /// # Arguments
    ///
    /// * `engine` - Engine to invoke per file
    /// * `script_path` - Rule script handed to the engine
    /// * `file_permissions` - Mode applied to each released output
    /// * `workers` - Files processed concurrently
    pub fn new(
        engine: Arc<dyn AnonymizationEngine>,
        script_path: impl Into<PathBuf>,
        file_permissions: u32,
        workers: usize,
    ) -> Self {
        Self {
            engine,
            script_path: script_path.into(),
            file_permissions,
            workers: workers.max(1),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an abort flag with the caller
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// The abort flag; once set, files not yet started are skipped
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Engine in use
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Removes staging files left behind by an interrupted run
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the output directory cannot be read
    pub fn clean_staging(output_dir: &Path) -> Result<usize> {
        if !output_dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(output_dir)? {
            let path = entry?.path();
            let stale = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.') && n.ends_with(STAGING_SUFFIX));
            if stale {
                fs::remove_file(&path)?;
                tracing::warn!(staging = %path.display(), "Removed stale staging file");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Anonymizes every input in `input_dir` into `output_dir`
    ///
    /// Results arrive in input order. The run is lazy: nothing happens until
    /// the returned stream is polled. Successful results are still staged;
    /// see [`release_staged`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the input directory cannot be enumerated
    pub fn process(self: &Arc<Self>, input_dir: &Path, output_dir: &Path) -> Result<EngineRun> {
        self.process_with(input_dir, output_dir, |result| async move { result })
    }

    /// Like [`process`](Self::process), running `stage` on each engine
    /// result inside the same worker slot
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the input directory cannot be enumerated
    pub fn process_with<F, Fut>(
        self: &Arc<Self>,
        input_dir: &Path,
        output_dir: &Path,
        stage: F,
    ) -> Result<EngineRun>
    where
        F: Fn(ProcessingResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcessingResult> + Send + 'static,
    {
        let tasks = plan(enumerate_inputs(input_dir)?, output_dir);
        let total = tasks.len();

        tracing::info!(
            input_dir = %input_dir.display(),
            output_dir = %output_dir.display(),
            files = total,
            workers = self.workers,
            engine = self.engine.name(),
            "Starting engine run"
        );

        let adapter = Arc::clone(self);
        let stage = Arc::new(stage);
        let inner = stream::iter(tasks)
            .map(move |task| {
                let adapter = Arc::clone(&adapter);
                let stage = Arc::clone(&stage);
                async move {
                    if adapter.abort.load(Ordering::SeqCst) {
                        tracing::info!(file = %task.source().display(), "Skipped after abort");
                        return None;
                    }
                    let result = adapter.run_task(task).await;
                    Some((*stage)(result).await)
                }
            })
            .buffered(self.workers)
            .filter_map(|result| async move { result })
            .boxed();

        Ok(EngineRun { inner, total })
    }

    /// Runs one planned task to an engine-stage result
    pub async fn run_task(&self, task: FileTask) -> ProcessingResult {
        let (source, output) = match task {
            FileTask::Collision { source, detail, .. } => {
                tracing::warn!(file = %source.display(), detail = %detail, "Output collision");
                return ProcessingResult::error(
                    source,
                    FailureReason::with_detail(ReasonCode::OutputCollision, detail),
                );
            }
            FileTask::Anonymize { source, output } => (source, output),
        };

        let staging = staging_path(&output);
        let status = self.engine.invoke(&self.script_path, &source, &staging).await;

        if let Some(reason) = status.failure() {
            discard_staging(&staging);
            tracing::warn!(
                file = %source.display(),
                reason = %reason.code,
                detail = reason.detail.as_deref().unwrap_or(""),
                "Engine failed"
            );
            return ProcessingResult::engine_failure(source, reason);
        }

        let file_permissions = self.file_permissions;
        let prepare_staging = staging.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            let prepared = prepare(&prepare_staging, file_permissions);
            if prepared.is_err() {
                discard_staging(&prepare_staging);
            }
            prepared
        })
        .await
        .unwrap_or_else(|e| {
            Err(FailureReason::with_detail(
                ReasonCode::Io,
                format!("staging task failed: {e}"),
            ))
        });

        match prepared {
            Ok(()) => {
                tracing::debug!(file = %source.display(), staging = %staging.display(), "Engine output staged");
                ProcessingResult::staged(source, staging, output)
            }
            Err(reason) if reason.code == ReasonCode::EngineOutput => {
                ProcessingResult::engine_failure(source, reason)
            }
            Err(reason) => ProcessingResult::error(source, reason),
        }
    }
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("engine", &self.engine.name())
            .field("script_path", &self.script_path)
            .field("workers", &self.workers)
            .finish()
    }
}

/// Checks the engine's staging file and applies the release mode
fn prepare(staging: &Path, file_permissions: u32) -> std::result::Result<(), FailureReason> {
    let usable = fs::metadata(staging)
        .map_err(|e| e.to_string())
        .and_then(|meta| {
            if !meta.is_file() {
                return Err("not a regular file".to_string());
            }
            fs::File::open(staging).map(|_| ()).map_err(|e| e.to_string())
        });
    if let Err(e) = usable {
        return Err(FailureReason::with_detail(
            ReasonCode::EngineOutput,
            format!("engine reported success but output is unusable: {e}"),
        ));
    }

    // a mode mismatch is caught by the validator's permission check
    if let Err(e) = set_mode(staging, file_permissions) {
        tracing::warn!(staging = %staging.display(), error = %e, "Failed to set output permissions");
    }
    Ok(())
}

/// Gives a validated staging file its final name without clobbering
///
/// Results that are not staged successes are returned unchanged. When the
/// name cannot be claimed the result becomes an error that still points at
/// the staging file, so the caller can quarantine it.
pub fn release_staged(result: ProcessingResult) -> ProcessingResult {
    if !result.is_success() {
        return result;
    }
    let (Some(staging), Some(output)) = (result.output_path.clone(), result.release_path.clone())
    else {
        return result;
    };

    match fs::hard_link(&staging, &output) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return result.into_error(FailureReason::with_detail(
                ReasonCode::OutputCollision,
                format!("{} appeared while the file was processed", output.display()),
            ));
        }
        Err(e) => {
            return result.into_error(FailureReason::with_detail(
                ReasonCode::Io,
                format!("cannot claim {}: {}", output.display(), e),
            ));
        }
    }

    if let Err(e) = fs::remove_file(&staging) {
        tracing::warn!(staging = %staging.display(), error = %e, "Failed to remove staging file");
    }
    tracing::debug!(file = %result.file_name(), output = %output.display(), "Output released");
    result.into_released()
}

fn discard_staging(staging: &Path) {
    match fs::remove_file(staging) {
        Ok(()) => tracing::debug!(staging = %staging.display(), "Discarded staging file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(staging = %staging.display(), error = %e, "Failed to discard staging file"),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Lazy, ordered, single-pass sequence of per-file results
pub struct EngineRun {
    inner: BoxStream<'static, ProcessingResult>,
    total: usize,
}

impl EngineRun {
    /// Number of files enumerated for the run
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Stream for EngineRun {
    type Item = ProcessingResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for EngineRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRun").field("total", &self.total).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::engine::EngineStatus;
    use crate::domain::Outcome;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    /// Copies input to output, failing for names containing "fail"
    struct CopyEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnonymizationEngine for CopyEngine {
        fn name(&self) -> &str {
            "copy"
        }

        async fn invoke(&self, _script: &Path, input: &Path, staging_output: &Path) -> EngineStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = input.file_name().unwrap().to_string_lossy().into_owned();
            if name.contains("fail") {
                return EngineStatus::Exited {
                    code: Some(1),
                    diagnostic: "refused".to_string(),
                };
            }
            if name.contains("silent") {
                return EngineStatus::Completed;
            }
            fs::copy(input, staging_output).unwrap();
            EngineStatus::Completed
        }
    }

    fn adapter(workers: usize) -> (Arc<EngineAdapter>, Arc<CopyEngine>) {
        let engine = Arc::new(CopyEngine {
            calls: AtomicUsize::new(0),
        });
        let adapter = EngineAdapter::new(engine.clone(), "/unused/script", 0o600, workers);
        (Arc::new(adapter), engine)
    }

    fn setup(names: &[&str]) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempdir().unwrap();
        let input = root.path().join("raw");
        let output = root.path().join("anonymized");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&output).unwrap();
        for name in names {
            fs::write(input.join(name), name.as_bytes()).unwrap();
        }
        (root, input, output)
    }

    #[test]
    fn test_enumerate_filters_and_sorts() {
        let (_root, input, _) = setup(&["b.dcm", "a.DCM", "notes.txt", "c.dcm"]);
        fs::create_dir(input.join("dir.dcm")).unwrap();

        let names: Vec<_> = enumerate_inputs(&input)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.DCM", "b.dcm", "c.dcm"]);
    }

    #[test]
    fn test_plan_detects_collisions() {
        let (_root, input, output) = setup(&["a.dcm", "a.DCM", "b.dcm"]);
        fs::write(output.join("b.dcm"), b"existing").unwrap();

        let tasks = plan(enumerate_inputs(&input).unwrap(), &output);
        assert!(matches!(tasks[0], FileTask::Anonymize { .. }));
        assert!(matches!(&tasks[1], FileTask::Collision { detail, .. } if detail.contains("earlier input")));
        assert!(matches!(&tasks[2], FileTask::Collision { detail, .. } if detail.contains("already exists")));
    }

    /// Runs a batch, releasing every staged success
    async fn run_and_release(adapter: &Arc<EngineAdapter>, input: &Path, output: &Path) -> Vec<ProcessingResult> {
        adapter
            .process_with(input, output, |result| async move { release_staged(result) })
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_process_in_order_with_failures() {
        let (_root, input, output) = setup(&["a.dcm", "b_fail.dcm", "c.dcm", "d_silent.dcm"]);
        let (adapter, _) = adapter(3);

        let results = run_and_release(&adapter, &input, &output).await;
        let outcomes: Vec<_> = results.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                Outcome::Success,
                Outcome::QuarantinedEngineFailure,
                Outcome::Success,
                Outcome::QuarantinedEngineFailure,
            ]
        );
        assert_eq!(results[1].failure.as_ref().unwrap().code, ReasonCode::EngineExit);
        assert_eq!(results[3].failure.as_ref().unwrap().code, ReasonCode::EngineOutput);

        assert_eq!(results[0].output_path, Some(output.join("a.dcm")));
        assert_eq!(fs::read(output.join("a.dcm")).unwrap(), b"a.dcm");
        assert!(!output.join("b_fail.dcm").exists());

        // no staging files survive
        let leftovers: Vec<_> = fs::read_dir(&output)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(STAGING_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_unreleased_output_stays_in_staging() {
        let (_root, input, output) = setup(&["a.dcm"]);
        let (adapter, _) = adapter(1);

        let results: Vec<_> = adapter.process(&input, &output).unwrap().collect().await;
        let staging = results[0].output_path.clone().unwrap();
        assert_eq!(results[0].release_path, Some(output.join("a.dcm")));
        assert!(staging.file_name().unwrap().to_string_lossy().ends_with(STAGING_SUFFIX));
        assert!(staging.exists());

        // nothing carries the final name until the result is released
        assert!(!output.join("a.dcm").exists());
        assert_eq!(EngineAdapter::clean_staging(&output).unwrap(), 1);
        assert!(fs::read_dir(&output).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_release_never_clobbers() {
        let (_root, input, output) = setup(&["a.dcm"]);
        let (adapter, _) = adapter(1);

        let results: Vec<_> = adapter.process(&input, &output).unwrap().collect().await;
        fs::write(output.join("a.dcm"), b"written meanwhile").unwrap();

        let released = release_staged(results[0].clone());
        assert_eq!(released.outcome, Outcome::Error);
        assert_eq!(released.failure.as_ref().unwrap().code, ReasonCode::OutputCollision);
        // still points at the staging file so it can be quarantined
        assert_eq!(released.output_path, results[0].output_path);
        assert_eq!(fs::read(output.join("a.dcm")).unwrap(), b"written meanwhile");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_released_output_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (_root, input, output) = setup(&["a.dcm"]);
        let (adapter, _) = adapter(1);
        let results = run_and_release(&adapter, &input, &output).await;
        assert!(results[0].is_success());

        let mode = fs::metadata(output.join("a.dcm")).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[tokio::test]
    async fn test_collision_does_not_invoke_engine() {
        let (_root, input, output) = setup(&["a.dcm"]);
        fs::write(output.join("a.dcm"), b"keep me").unwrap();
        let (adapter, engine) = adapter(1);

        let results: Vec<_> = adapter.process(&input, &output).unwrap().collect().await;
        assert_eq!(results[0].outcome, Outcome::Error);
        assert_eq!(results[0].failure.as_ref().unwrap().code, ReasonCode::OutputCollision);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read(output.join("a.dcm")).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_abort_skips_unstarted_files() {
        let (_root, input, output) = setup(&["a.dcm", "b.dcm", "c.dcm"]);
        let (adapter, _) = adapter(1);
        let abort = adapter.abort_flag();

        let flag = Arc::clone(&abort);
        let run = adapter
            .process_with(&input, &output, move |result| {
                let flag = Arc::clone(&flag);
                async move {
                    flag.store(true, Ordering::SeqCst);
                    release_staged(result)
                }
            })
            .unwrap();
        assert_eq!(run.total(), 3);

        let results: Vec<_> = run.collect().await;
        assert_eq!(results.len(), 1);
        assert!(!output.join("b.dcm").exists());
    }

    #[test]
    fn test_clean_staging() {
        let (_root, _input, output) = setup(&[]);
        fs::write(output.join(".a.1234.staging"), b"partial").unwrap();
        fs::write(output.join("a.dcm"), b"released").unwrap();

        assert_eq!(EngineAdapter::clean_staging(&output).unwrap(), 1);
        assert!(output.join("a.dcm").exists());
    }
}
