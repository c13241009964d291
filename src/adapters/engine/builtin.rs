//! Built-in engine: in-process tag rewrite with dicom-rs

use super::traits::{AnonymizationEngine, EngineStatus};
use crate::adapters::dicom;
use crate::anonymization::rules::{dictionary, RuleSet};
use crate::domain::TagAction;
use async_trait::async_trait;
use dicom_core::{DataElement, PrimitiveValue, Tag};
use dicom_object::InMemDicomObject;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Applies the compiled rules directly, without a rule script
///
/// Removal deletes the attribute wherever it occurs, including inside
/// sequence items at any depth. Replacement writes the configured value,
/// keeping the VR of an existing attribute and otherwise using the
/// dictionary VR; inside sequence items only existing attributes are
/// replaced.
#[derive(Debug, Clone)]
pub struct BuiltinEngine {
    rules: Arc<RuleSet>,
}

impl BuiltinEngine {
    /// Creates an engine over a compiled rule set
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }
}

/// Rewrites one file; returns a diagnostic on failure
pub fn rewrite_file(rules: &RuleSet, input: &Path, output: &Path) -> Result<usize, String> {
    let mut obj = dicom::open(input)?;
    let touched = apply_rules(rules, &mut obj, false);

    obj.write_to_file(output)
        .map_err(|e| format!("failed to write {}: {}", output.display(), e))?;
    Ok(touched)
}

fn apply_rules(rules: &RuleSet, set: &mut InMemDicomObject, nested: bool) -> usize {
    let mut touched = 0;

    for rule in rules.iter() {
        let tag: Tag = rule.tag.into();
        match &rule.action {
            TagAction::Remove => {
                if set.remove_element(tag) {
                    touched += 1;
                }
            }
            TagAction::Replace(value) => {
                let existing = set.element_opt(tag).ok().flatten().map(|elem| elem.vr());
                if nested && existing.is_none() {
                    continue;
                }
                let vr = existing.unwrap_or_else(|| dictionary::default_vr(rule.tag));
                set.put(DataElement::new(tag, vr, PrimitiveValue::from(value.as_str())));
                touched += 1;
            }
        }
    }

    for sequence in dicom::sequence_tags(set) {
        set.update_value(sequence, |value| {
            if let Some(items) = value.items_mut() {
                for item in items.iter_mut() {
                    touched += apply_rules(rules, item, true);
                }
            }
        });
    }

    touched
}

#[async_trait]
impl AnonymizationEngine for BuiltinEngine {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn invoke(&self, _script: &Path, input: &Path, staging_output: &Path) -> EngineStatus {
        let rules = Arc::clone(&self.rules);
        let input: PathBuf = input.to_path_buf();
        let output: PathBuf = staging_output.to_path_buf();

        let joined = tokio::task::spawn_blocking(move || {
            let touched = rewrite_file(&rules, &input, &output);
            (input, touched)
        })
        .await;

        match joined {
            Ok((input, Ok(touched))) => {
                tracing::debug!(input = %input.display(), attributes = touched, "Built-in rewrite complete");
                EngineStatus::Completed
            }
            Ok((_, Err(diagnostic))) => EngineStatus::Exited {
                code: None,
                diagnostic,
            },
            Err(e) => EngineStatus::Exited {
                code: None,
                diagnostic: format!("built-in engine task failed: {e}"),
            },
        }
    }
}
