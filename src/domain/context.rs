//! Error context extension trait
//!
//! Adds `.context()` / `.with_context()` to any result whose error converts
//! into [`DeidError`], keeping the variant so exit codes stay meaningful.
//!
//! ```rust
//! use dicom_deid::domain::Result;
//! use dicom_deid::domain::context::ResultExt;
//!
//! fn read_manifest(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))
//! }
//! ```

use crate::domain::errors::DeidError;
use crate::domain::result::Result;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context computed only on error
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<DeidError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| wrap(e.into(), context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

/// Prefixes the message while keeping the variant
fn wrap(err: DeidError, context: impl std::fmt::Display) -> DeidError {
    match err {
        DeidError::Configuration(m) => DeidError::Configuration(format!("{context}: {m}")),
        DeidError::KeyUnavailable(m) => DeidError::KeyUnavailable(format!("{context}: {m}")),
        DeidError::KeyCorrupt(m) => DeidError::KeyCorrupt(format!("{context}: {m}")),
        DeidError::Engine(m) => DeidError::Engine(format!("{context}: {m}")),
        DeidError::Quarantine(m) => DeidError::Quarantine(format!("{context}: {m}")),
        DeidError::AuditWrite(m) => DeidError::AuditWrite(format!("{context}: {m}")),
        DeidError::AuditVerify(m) => DeidError::AuditVerify(format!("{context}: {m}")),
        DeidError::Serialization(m) => DeidError::Serialization(format!("{context}: {m}")),
        DeidError::Io(m) => DeidError::Io(format!("{context}: {m}")),
        DeidError::Other(m) => DeidError::Other(format!("{context}: {m}")),
    }
}
