//! Compliance module
//!
//! Provides the HIPAA Safe Harbor baseline that every compiled rule set
//! starts from.
//!
//! # Examples
//!
//! ```
//! use dicom_deid::anonymization::compliance::hipaa::{self, SafeHarborIdentifier};
//!
//! assert!(hipaa::default_tag_names().contains(&"PatientID".to_string()));
//! assert_eq!(hipaa::identifier_for("PatientName"), Some(SafeHarborIdentifier::Name));
//! ```

pub mod hipaa;

pub use hipaa::SafeHarborIdentifier;
