//! Batch orchestration
//!
//! - [`BatchCoordinator`] wires the engine adapter, validator, quarantine
//!   and audit logger together for one session
//! - [`BatchReport`] is the per-run result handed back to the CLI

pub mod coordinator;
pub mod session;
pub mod summary;

pub use coordinator::BatchCoordinator;
pub use session::Session;
pub use summary::{BatchReport, FileLine};
