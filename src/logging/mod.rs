//! Logging and observability
//!
//! Structured logging via `tracing`:
//! - human-readable console output on stderr
//! - JSON files with rotation in `directories.logs`
//!
//! # Example
//!
//! ```no_run
//! use dicom_deid::logging::init_logging;
//! use dicom_deid::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config, "logs".as_ref()).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard, LOG_FILE_NAME};

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use dicom_deid::log_error_with_context;
/// use dicom_deid::domain::DeidError;
///
/// let error = DeidError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
