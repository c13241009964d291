//! CLI command implementations

pub mod audit;
pub mod init;
pub mod rules;
pub mod run;
pub mod validate;

use crate::domain::DeidError;

/// Prints a fatal error and returns its exit code
pub(crate) fn report_error(context: &str, error: &DeidError) -> i32 {
    crate::log_error_with_context!(error, context);
    eprintln!("❌ {context}");
    eprintln!("   Error: {error}");
    error.exit_code()
}
