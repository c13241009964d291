//! Post-write verification
//!
//! - [`Validator`] decides whether an engine output may be released
//! - [`checksum`] hashes files for quarantine moves and audit evidence

pub mod checksum;
pub mod verify;

pub use verify::Validator;
