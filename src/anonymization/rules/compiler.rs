//! Rule compilation
//!
//! Turns the declarative `[anonymization]` configuration into a [`RuleSet`]:
//! one resolved [`TagRule`] per tag, ordered by tag.
//!
//! Precedence when the same tag is listed more than once:
//! - a replacement always beats a removal (warning diagnostic)
//! - among replacements, the last entry wins (warning diagnostic if the
//!   values differ)
//! - duplicate removals collapse silently

use super::dictionary;
use super::script;
use crate::config::{AdditionalTag, AnonymizationConfig, ReplaceTag};
use crate::core::verification::checksum::calculate_checksum_bytes;
use crate::domain::{DeidError, Result, TagAction, TagAddress, TagRule};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A non-fatal finding raised while compiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Tag the finding is about
    pub tag: TagAddress,

    /// Human-readable message
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tag, self.message)
    }
}

/// Immutable, deduplicated set of compiled rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<TagAddress, TagRule>,
    diagnostics: Vec<Diagnostic>,
}

impl RuleSet {
    /// Compiles the `[anonymization]` section
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::Configuration`] if any entry cannot be resolved
    /// to exactly one tag
    ///
    /// # Examples
    ///
    /// ```
    /// use dicom_deid::anonymization::rules::RuleSet;
    /// use dicom_deid::config::{AnonymizationConfig, ReplaceTag};
    /// use dicom_deid::domain::{TagAction, TagAddress};
    ///
    /// let config = AnonymizationConfig {
    ///     hipaa_tags: vec!["PatientName".into(), "PatientID".into()],
    ///     additional_tags: vec![],
    ///     replace_tags: vec![ReplaceTag::new("PatientName", "ANONYMOUS")],
    /// };
    /// let rules = RuleSet::compile(&config).unwrap();
    ///
    /// assert_eq!(rules.len(), 2);
    /// let name = rules.get(TagAddress::new(0x0010, 0x0010)).unwrap();
    /// assert_eq!(name.action, TagAction::Replace("ANONYMOUS".into()));
    /// assert_eq!(rules.diagnostics().len(), 1);
    /// ```
    pub fn compile(config: &AnonymizationConfig) -> Result<Self> {
        compile(
            &config.hipaa_tags,
            &config.additional_tags,
            &config.replace_tags,
        )
    }

    /// Rules in tag order
    pub fn iter(&self) -> impl Iterator<Item = &TagRule> {
        self.rules.values()
    }

    /// Rule for a tag
    pub fn get(&self, tag: TagAddress) -> Option<&TagRule> {
        self.rules.get(&tag)
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Tags that must be absent from every output
    pub fn removals(&self) -> impl Iterator<Item = &TagRule> {
        self.iter().filter(|r| r.action == TagAction::Remove)
    }

    /// Tags that must carry a fixed value in every output
    pub fn replacements(&self) -> impl Iterator<Item = &TagRule> {
        self.iter().filter(|r| matches!(r.action, TagAction::Replace(_)))
    }

    /// Warnings raised during compilation
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// SHA-256 over the rendered rule lines, independent of diagnostics
    pub fn fingerprint(&self) -> String {
        calculate_checksum_bytes(script::rule_lines(self).join("\n").as_bytes())
    }
}

/// Compiles raw rule inputs into a [`RuleSet`]
///
/// # Arguments
///
/// * `hipaa_tags` - Baseline keywords, always removed
/// * `additional_tags` - Extra removals by keyword and/or address
/// * `replace_tags` - Keyword to fixed value
///
/// # Errors
///
/// Returns [`DeidError::Configuration`] when a keyword is not in the standard
/// dictionary, when an explicit address contradicts its keyword, or when an
/// additional tag names neither
pub fn compile(
    hipaa_tags: &[String],
    additional_tags: &[AdditionalTag],
    replace_tags: &[ReplaceTag],
) -> Result<RuleSet> {
    let mut rules: BTreeMap<TagAddress, TagRule> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for keyword in hipaa_tags {
        let tag = resolve(keyword, "anonymization.hipaa_tags")?;
        rules
            .entry(tag)
            .or_insert_with(|| TagRule::remove(tag, Some(keyword.trim().to_string())));
    }

    for additional in additional_tags {
        let (tag, keyword) = resolve_additional(additional)?;
        rules
            .entry(tag)
            .or_insert_with(|| TagRule::remove(tag, keyword));
    }

    for replace in replace_tags {
        let tag = resolve(&replace.name, "anonymization.replace_tags")?;
        let rule = TagRule::replace(tag, Some(replace.name.trim().to_string()), &replace.value);

        match rules.get(&tag).map(|r| &r.action) {
            Some(TagAction::Remove) => diagnostics.push(Diagnostic {
                tag,
                message: format!(
                    "{} is listed for removal and replacement; replacement wins",
                    rule.label()
                ),
            }),
            Some(TagAction::Replace(previous)) if previous != &replace.value => {
                diagnostics.push(Diagnostic {
                    tag,
                    message: format!(
                        "{} has several replacement values; using {:?} over {:?}",
                        rule.label(),
                        replace.value,
                        previous
                    ),
                })
            }
            _ => {}
        }

        rules.insert(tag, rule);
    }

    for diagnostic in &diagnostics {
        tracing::warn!(tag = %diagnostic.tag, "{}", diagnostic.message);
    }

    tracing::debug!(
        rules = rules.len(),
        diagnostics = diagnostics.len(),
        "Rule set compiled"
    );

    Ok(RuleSet { rules, diagnostics })
}

fn resolve(keyword: &str, field: &str) -> Result<TagAddress> {
    dictionary::resolve_keyword(keyword).ok_or_else(|| {
        DeidError::Configuration(format!(
            "{field}: '{keyword}' is not a keyword in the standard DICOM dictionary"
        ))
    })
}

fn resolve_additional(tag: &AdditionalTag) -> Result<(TagAddress, Option<String>)> {
    let name = tag
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let address = match (tag.group, tag.element) {
        (Some(group), Some(element)) => Some(TagAddress::new(group, element)),
        (None, None) => None,
        _ => {
            return Err(DeidError::Configuration(format!(
                "anonymization.additional_tags: {:?} must set both group and element",
                name.unwrap_or("<unnamed>")
            )))
        }
    };

    match (name, address) {
        (Some(name), Some(address)) => {
            let resolved = resolve(name, "anonymization.additional_tags")?;
            if resolved != address {
                return Err(DeidError::Configuration(format!(
                    "anonymization.additional_tags: '{name}' is {resolved}, not {address}"
                )));
            }
            Ok((address, Some(name.to_string())))
        }
        (Some(name), None) => Ok((
            resolve(name, "anonymization.additional_tags")?,
            Some(name.to_string()),
        )),
        (None, Some(address)) => Ok((address, dictionary::keyword_for(address))),
        (None, None) => Err(DeidError::Configuration(
            "anonymization.additional_tags: entry names neither a keyword nor a group/element"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_removals_ordered_by_tag() {
        let rules = compile(&names(&["PatientID", "InstitutionName", "PatientName"]), &[], &[]).unwrap();
        let tags: Vec<_> = rules.iter().map(|r| r.tag).collect();
        assert_eq!(
            tags,
            vec![
                TagAddress::new(0x0008, 0x0080),
                TagAddress::new(0x0010, 0x0010),
                TagAddress::new(0x0010, 0x0020),
            ]
        );
        assert!(rules.diagnostics().is_empty());
    }

    #[test]
    fn test_unknown_keyword_is_configuration_error() {
        let err = compile(&names(&["PatientNmae"]), &[], &[]).unwrap_err();
        assert!(matches!(err, DeidError::Configuration(_)));
        assert!(err.to_string().contains("PatientNmae"));
    }

    #[test]
    fn test_replacement_beats_removal() {
        let rules = compile(
            &names(&["InstitutionName"]),
            &[],
            &[ReplaceTag::new("InstitutionName", "ANONYMOUS_INSTITUTION")],
        )
        .unwrap();

        let rule = rules.get(TagAddress::new(0x0008, 0x0080)).unwrap();
        assert_eq!(rule.action, TagAction::Replace("ANONYMOUS_INSTITUTION".into()));
        assert_eq!(rules.removals().count(), 0);
        assert_eq!(rules.diagnostics().len(), 1);
        assert!(rules.diagnostics()[0].message.contains("replacement wins"));
    }

    #[test]
    fn test_last_replacement_wins() {
        let rules = compile(
            &[],
            &[],
            &[
                ReplaceTag::new("PatientName", "FIRST"),
                ReplaceTag::new("PatientName", "SECOND"),
            ],
        )
        .unwrap();
        assert_eq!(
            rules.get(TagAddress::new(0x0010, 0x0010)).unwrap().action,
            TagAction::Replace("SECOND".into())
        );
        assert_eq!(rules.diagnostics().len(), 1);
    }

    #[test]
    fn test_additional_by_address_and_keyword() {
        let rules = compile(
            &[],
            &[
                AdditionalTag::address(0x0010, 0x1000),
                AdditionalTag::named("StudyDescription"),
                AdditionalTag {
                    name: Some("PatientAge".into()),
                    group: Some(0x0010),
                    element: Some(0x1010),
                },
            ],
            &[],
        )
        .unwrap();
        assert_eq!(rules.len(), 3);
        assert!(rules.get(TagAddress::new(0x0010, 0x1000)).is_some());
        assert!(rules.get(TagAddress::new(0x0008, 0x1030)).is_some());
    }

    #[test]
    fn test_contradicting_address_rejected() {
        let err = compile(
            &[],
            &[AdditionalTag {
                name: Some("PatientName".into()),
                group: Some(0x0010),
                element: Some(0x0020),
            }],
            &[],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not (0010,0020)"));
    }

    #[test]
    fn test_empty_additional_rejected() {
        let err = compile(
            &[],
            &[AdditionalTag {
                name: None,
                group: None,
                element: None,
            }],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, DeidError::Configuration(_)));
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let config = AnonymizationConfig::default();
        let first = RuleSet::compile(&config).unwrap();
        let second = RuleSet::compile(&config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_rules() {
        let a = compile(&names(&["PatientName"]), &[], &[]).unwrap();
        let b = compile(&names(&["PatientID"]), &[], &[]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
