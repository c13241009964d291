//! Anonymization engine abstraction
//!
//! An engine reads one input file and writes an anonymized copy to a staging
//! path. It knows nothing about output naming, validation or quarantine.

use crate::domain::{FailureReason, ReasonCode};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// How an engine invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// The engine reported success; the staging output still has to be checked
    Completed,

    /// The engine could not be started
    LaunchFailed(String),

    /// The engine finished unsuccessfully
    Exited {
        /// Exit code, if the platform reported one
        code: Option<i32>,
        /// Tail of the engine's diagnostic output
        diagnostic: String,
    },

    /// The engine was terminated by a signal
    Signaled {
        /// Signal number
        signal: i32,
        /// Tail of the engine's diagnostic output
        diagnostic: String,
    },

    /// The engine did not finish in time and was killed
    TimedOut(Duration),
}

impl EngineStatus {
    /// Failure reason for every status except [`EngineStatus::Completed`]
    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            EngineStatus::Completed => None,
            EngineStatus::LaunchFailed(detail) => Some(FailureReason::with_detail(
                ReasonCode::EngineLaunch,
                detail.clone(),
            )),
            EngineStatus::Exited { code, diagnostic } => {
                let status = match code {
                    Some(code) => format!("exit status {code}"),
                    None => "engine failed".to_string(),
                };
                Some(FailureReason::with_detail(
                    ReasonCode::EngineExit,
                    with_diagnostic(status, diagnostic),
                ))
            }
            EngineStatus::Signaled { signal, diagnostic } => Some(FailureReason::with_detail(
                ReasonCode::EngineSignal,
                with_diagnostic(format!("terminated by signal {signal}"), diagnostic),
            )),
            EngineStatus::TimedOut(after) => Some(FailureReason::with_detail(
                ReasonCode::EngineTimeout,
                format!("killed after {}s", after.as_secs()),
            )),
        }
    }
}

fn with_diagnostic(status: String, diagnostic: &str) -> String {
    let diagnostic = diagnostic.trim();
    if diagnostic.is_empty() {
        status
    } else {
        format!("{status}: {diagnostic}")
    }
}

/// An anonymization engine
///
/// Implementations must not write anywhere except `staging_output`.
#[async_trait]
pub trait AnonymizationEngine: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Anonymizes `input` into `staging_output` using the rule script at `script`
    async fn invoke(&self, script: &Path, input: &Path, staging_output: &Path) -> EngineStatus;
}
