// dicom-deid - DICOM de-identification with an encrypted audit trail
// Copyright (c) 2025 dicom-deid Contributors
// Licensed under the MIT License

//! # dicom-deid - DICOM de-identification
//!
//! dicom-deid strips or replaces protected health information (PHI) in DICOM
//! files before they leave a controlled environment, and keeps an encrypted,
//! tamper-evident audit trail of every decision.
//!
//! ## Overview
//!
//! - **Compiling** configured tag names into a resolved, deterministic rule set
//! - **Anonymizing** each input with a swappable engine (in-process or external)
//! - **Validating** every output: permissions, structure, PHI residue
//! - **Quarantining** anything that fails, with a sidecar explaining why
//! - **Auditing** every file with an AES-256-GCM encrypted, gap-free log
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Batch orchestration, validation, quarantine
//! - [`anonymization`] - Rule compilation, HIPAA baseline, audit log
//! - [`adapters`] - DICOM file access and anonymization engines
//! - [`security`] - Audit key management and encryption
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dicom_deid::config::load_config;
//! use dicom_deid::core::batch::BatchCoordinator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("dicom-deid.toml")?;
//!     let (_tx, shutdown) = tokio::sync::watch::channel(false);
//!
//!     let report = BatchCoordinator::new(config)?.run(shutdown).await?;
//!
//!     println!("valid: {}", report.is_valid());
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! A file reaches the output directory only after the validator found none
//! of the Remove tags and every Replace tag carrying its configured value.
//! Every file that does not is quarantined, and every file, released or not,
//! has exactly one audit record. If the audit record cannot be written the
//! file is quarantined and the batch stops.
//!
//! ## Error Handling
//!
//! Fatal conditions are [`domain::DeidError`] values; per-file failures are
//! [`domain::Outcome`]s and never abort the batch on their own.

pub mod adapters;
pub mod anonymization;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod security;
