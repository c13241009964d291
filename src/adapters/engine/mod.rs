//! Anonymization engines
//!
//! - [`ExternalEngine`] - third-party executable driven by a rule script
//! - [`BuiltinEngine`] - in-process rewrite with dicom-rs
//!
//! Both implement [`AnonymizationEngine`]; [`from_config`] picks one from
//! the `[engine]` section.

pub mod builtin;
pub mod external;
pub mod traits;

pub use builtin::BuiltinEngine;
pub use external::ExternalEngine;
pub use traits::{AnonymizationEngine, EngineStatus};

use crate::anonymization::rules::RuleSet;
use crate::config::{EngineConfig, EngineKind};
use crate::domain::Result;
use std::sync::Arc;

/// Builds the configured engine
///
/// # Errors
///
/// Returns a configuration error if the external engine has no program
pub fn from_config(config: &EngineConfig, rules: Arc<RuleSet>) -> Result<Arc<dyn AnonymizationEngine>> {
    let engine: Arc<dyn AnonymizationEngine> = match config.kind {
        EngineKind::Builtin => Arc::new(BuiltinEngine::new(rules)),
        EngineKind::External => Arc::new(ExternalEngine::from_config(config)?),
    };
    tracing::info!(engine = engine.name(), "Anonymization engine selected");
    Ok(engine)
}
