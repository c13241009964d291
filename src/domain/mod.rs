//! Domain models and types.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Tag addressing** ([`TagAddress`]) and compiled rules ([`TagRule`], [`TagAction`])
//! - **Per-file results** ([`ProcessingResult`], [`Outcome`], [`FailureReason`])
//! - **Error types** ([`DeidError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, DeidError>`]. Per-file problems
//! (the engine failed, a PHI tag survived) are not errors: they travel as an
//! [`Outcome`] so that one bad file never aborts the batch.
//!
//! ```rust
//! use dicom_deid::domain::{FailureReason, Outcome, ProcessingResult, ReasonCode};
//!
//! let result = ProcessingResult::success("data/raw/a.dcm", "data/anonymized/a.dcm")
//!     .into_validation_failure(FailureReason::new(ReasonCode::Integrity));
//! assert_eq!(result.outcome, Outcome::QuarantinedValidationFailure);
//! ```

pub mod context;
pub mod errors;
pub mod processing;
pub mod result;
pub mod tag;

// Re-export commonly used types for convenience
pub use errors::DeidError;
pub use processing::{FailureReason, Outcome, ProcessingResult, ReasonCode};
pub use result::Result;
pub use tag::{TagAction, TagAddress, TagRule};
