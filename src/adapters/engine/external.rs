//! External engine: a third-party executable driven by the rule script

use super::traits::{AnonymizationEngine, EngineStatus};
use crate::config::EngineConfig;
use crate::domain::{DeidError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};

/// Bytes of stderr kept as the failure diagnostic
const DIAGNOSTIC_TAIL_BYTES: usize = 2048;

const STDERR_CHUNK_BYTES: usize = 1024;

/// Runs a configured program once per file
///
/// `{script}`, `{input}` and `{output}` in the argument list are replaced
/// with the rule script, the input file and the staging output.
#[derive(Debug, Clone)]
pub struct ExternalEngine {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalEngine {
    /// Creates an engine for an explicit program
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Creates the engine from `[engine]`
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::Configuration`] if no program is configured
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let program = config
            .program
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                DeidError::Configuration("engine.program is not configured".to_string())
            })?;
        Ok(Self::new(
            program,
            config.args.clone(),
            Duration::from_secs(config.timeout_seconds),
        ))
    }

    fn expand_args(&self, script: &Path, input: &Path, output: &Path) -> Vec<String> {
        let script = script.to_string_lossy();
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{script}", &script)
                    .replace("{input}", &input)
                    .replace("{output}", &output)
            })
            .collect()
    }
}

#[async_trait]
impl AnonymizationEngine for ExternalEngine {
    fn name(&self) -> &str {
        &self.program
    }

    async fn invoke(&self, script: &Path, input: &Path, staging_output: &Path) -> EngineStatus {
        let args = self.expand_args(script, input, staging_output);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(program = %self.program, error = %e, "Failed to launch engine");
                return EngineStatus::LaunchFailed(format!("{}: {}", self.program, e));
            }
        };

        // On timeout the child is dropped on return, which kills it (kill_on_drop).
        let stderr = child.stderr.take();
        let run = async {
            let (tail, status) = tokio::join!(read_tail(stderr), child.wait());
            status.map(|status| (status, tail))
        };
        let (status, tail) = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(finished)) => finished,
            Ok(Err(e)) => {
                return EngineStatus::Exited {
                    code: None,
                    diagnostic: format!("failed to wait for engine: {e}"),
                }
            }
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    input = %input.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "Engine timed out"
                );
                return EngineStatus::TimedOut(self.timeout);
            }
        };

        if status.success() {
            return EngineStatus::Completed;
        }

        let diagnostic = String::from_utf8_lossy(&tail).trim().to_string();
        if let Some(code) = status.code() {
            return EngineStatus::Exited {
                code: Some(code),
                diagnostic,
            };
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return EngineStatus::Signaled { signal, diagnostic };
            }
        }

        EngineStatus::Exited {
            code: None,
            diagnostic,
        }
    }
}

/// Drains stderr, keeping only its last [`DIAGNOSTIC_TAIL_BYTES`]
async fn read_tail(stderr: Option<ChildStderr>) -> Vec<u8> {
    let Some(mut stderr) = stderr else {
        return Vec::new();
    };

    let mut tail = VecDeque::with_capacity(DIAGNOSTIC_TAIL_BYTES + STDERR_CHUNK_BYTES);
    let mut chunk = [0u8; STDERR_CHUNK_BYTES];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tail.extend(&chunk[..n]);
                let excess = tail.len().saturating_sub(DIAGNOSTIC_TAIL_BYTES);
                tail.drain(..excess);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading engine stderr");
                break;
            }
        }
    }
    tail.into_iter().collect()
}
