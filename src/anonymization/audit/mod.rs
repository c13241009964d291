//! Encrypted audit trail
//!
//! One record per processed file, appended to `<audit_dir>/audit.log` and
//! synced before the file's outcome is considered final. Records are never
//! updated or deleted; corrections are new compensation records.

pub mod logger;
pub mod reader;
pub mod record;

pub use logger::{AuditLogger, AUDIT_LOG_FILE};
pub use reader::{AuditReader, AuditVerification, VerificationIssue, VerifiedRecord};
pub use record::{AuditEvent, AuditHeader, AuditLine, FileAuditEntry, SessionSummaryEntry};
