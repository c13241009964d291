//! Anonymization rules and evidence
//!
//! - **Compliance**: the HIPAA Safe Harbor baseline tag list
//! - **Rules**: compilation of configured tags into a resolved [`RuleSet`]
//! - **Audit**: the encrypted, append-only record of every file's outcome
//!
//! # Usage
//!
//! ```rust
//! use dicom_deid::anonymization::RuleSet;
//! use dicom_deid::config::AnonymizationConfig;
//!
//! let rules = RuleSet::compile(&AnonymizationConfig::default())?;
//! assert!(rules.removals().count() > 0);
//! # Ok::<(), dicom_deid::domain::DeidError>(())
//! ```

pub mod audit;
pub mod compliance;
pub mod rules;

pub use audit::{AuditLogger, AuditReader};
pub use rules::RuleSet;
