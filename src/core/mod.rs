//! Core business logic for dicom-deid.
//!
//! # Modules
//!
//! - [`anonymize`] - Input enumeration, engine invocation, output claiming
//! - [`verification`] - Post-write validation and checksums
//! - [`quarantine`] - Isolation of failed files with sidecar metadata
//! - [`batch`] - Session start-up and the per-file pipeline
//!
//! # Run Workflow
//!
//! 1. **Compile**: resolve configured tags into a rule set
//! 2. **Key**: load or create the audit key
//! 3. **Recover**: finish quarantine moves a crash interrupted
//! 4. **Anonymize**: invoke the engine per file on a staging path
//! 5. **Validate**: permissions, integrity, PHI residue
//! 6. **Quarantine** failures; **audit** every file
//! 7. **Report**: per-file lines plus aggregate validity
//!
//! # Example
//!
//! ```rust,no_run
//! use dicom_deid::config::load_config;
//! use dicom_deid::core::batch::BatchCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("dicom-deid.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let coordinator = BatchCoordinator::new(config)?;
//! let report = coordinator.run(shutdown_rx).await?;
//!
//! println!("Released: {}/{}", report.succeeded, report.total);
//! # Ok(())
//! # }
//! ```

pub mod anonymize;
pub mod batch;
pub mod quarantine;
pub mod verification;
