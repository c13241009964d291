//! External system integrations.
//!
//! - [`dicom`] - DICOM Part-10 file access (dicom-rs)
//! - [`engine`] - Anonymization engines (trait-based)
//!
//! Adapters isolate third-party code behind small interfaces so the core
//! pipeline can be tested with mock engines.

pub mod dicom;
pub mod engine;
