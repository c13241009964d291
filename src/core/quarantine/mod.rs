//! Quarantine of files that failed anonymization or validation

pub mod manager;
pub mod record;

pub use manager::{QuarantineManager, RecoveryReport};
pub use record::{QuarantineOrigin, QuarantineRecord, QuarantineState};
