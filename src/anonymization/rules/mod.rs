//! Rule compilation
//!
//! Keywords are resolved against the standard DICOM dictionary once, up
//! front. Every later stage (engine, validator, audit) works on the resolved
//! [`RuleSet`].

pub mod compiler;
pub mod dictionary;
pub mod script;

pub use compiler::{compile, Diagnostic, RuleSet};
pub use script::{render_script, write_script};
