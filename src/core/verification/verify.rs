//! Post-write validation of engine output
//!
//! Re-opens each output the engine produced and decides whether it may be
//! released. Checks run in order and stop at the first failure:
//!
//! 1. permissions - file mode matches `security.file_permissions`
//! 2. integrity - Part-10 file with a usable file meta group
//! 3. PHI residue - every Remove tag absent at any depth, every Replace tag
//!    exact at the top level and wherever it occurs in sequence items
//!
//! Anything the validator cannot evaluate counts as a failure.

use crate::adapters::dicom;
use crate::anonymization::rules::RuleSet;
use crate::config::ValidationConfig;
use crate::domain::{FailureReason, ProcessingResult, ReasonCode, TagAction};
use dicom_object::{DefaultDicomObject, InMemDicomObject};
use std::path::Path;
use std::sync::Arc;

/// Validates engine output before release
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
    file_permissions: u32,
    rules: Arc<RuleSet>,
}

impl Validator {
    /// Create a new validator
    ///
    /// # Arguments
    ///
    /// * `config` - Check toggles
    /// * `file_permissions` - Mode every released file must carry
    /// * `rules` - The rule set the engine was asked to apply
    pub fn new(config: ValidationConfig, file_permissions: u32, rules: Arc<RuleSet>) -> Self {
        if !config.verify_after_write {
            tracing::warn!("Post-write validation is disabled; outputs are released unchecked");
        } else if !config.phi_check {
            tracing::warn!("PHI residue check is disabled");
        }
        Self {
            config,
            file_permissions,
            rules,
        }
    }

    /// Validates a result whose outcome is still `Success`
    ///
    /// Results with any other outcome are returned unchanged. A failing
    /// check turns the result into `QuarantinedValidationFailure`, keeping
    /// the output path so the file can be quarantined.
    pub fn validate(&self, result: ProcessingResult) -> ProcessingResult {
        if !result.is_success() || !self.config.verify_after_write {
            return result;
        }

        let Some(output) = result.output_path.clone() else {
            return result.into_validation_failure(FailureReason::with_detail(
                ReasonCode::Integrity,
                "no output file recorded",
            ));
        };

        match self.check(&output) {
            Ok(()) => {
                tracing::debug!(file = %result.file_name(), "Output validated");
                result
            }
            Err(reason) => {
                tracing::warn!(
                    file = %result.file_name(),
                    reason = %reason.code,
                    detail = reason.detail.as_deref().unwrap_or(""),
                    "Output failed validation"
                );
                result.into_validation_failure(reason)
            }
        }
    }

    /// Runs the enabled checks against one file
    pub fn check(&self, output: &Path) -> Result<(), FailureReason> {
        if self.config.check_permissions {
            self.check_permissions(output)?;
        }

        if !self.config.integrity_check && !self.config.phi_check {
            return Ok(());
        }

        let opened = dicom::open(output);

        if self.config.integrity_check {
            let obj = opened
                .as_ref()
                .map_err(|e| FailureReason::with_detail(ReasonCode::Integrity, e.clone()))?;
            dicom::file_meta(obj)
                .map_err(|e| FailureReason::with_detail(ReasonCode::Integrity, e))?;
        }

        if self.config.phi_check {
            let obj = opened.as_ref().map_err(|e| {
                FailureReason::with_detail(ReasonCode::PhiResidue, format!("cannot evaluate: {e}"))
            })?;
            self.check_phi_residue(obj)?;
        }

        Ok(())
    }

    #[cfg(unix)]
    fn check_permissions(&self, output: &Path) -> Result<(), FailureReason> {
        use std::os::unix::fs::PermissionsExt;

        let meta = std::fs::metadata(output)
            .map_err(|e| FailureReason::with_detail(ReasonCode::Permissions, e.to_string()))?;
        let mode = meta.permissions().mode() & 0o777;
        if mode != self.file_permissions {
            return Err(FailureReason::with_detail(
                ReasonCode::Permissions,
                format!("mode {:o}, expected {:o}", mode, self.file_permissions),
            ));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(&self, output: &Path) -> Result<(), FailureReason> {
        std::fs::metadata(output)
            .map(|_| ())
            .map_err(|e| FailureReason::with_detail(ReasonCode::Permissions, e.to_string()))
    }

    fn check_phi_residue(&self, obj: &DefaultDicomObject) -> Result<(), FailureReason> {
        self.check_data_set(obj, false)?;
        for item in dicom::nested_items(obj) {
            self.check_data_set(item, true)?;
        }
        Ok(())
    }

    /// Checks one data set; inside sequence items an absent replacement is fine
    fn check_data_set(&self, set: &InMemDicomObject, nested: bool) -> Result<(), FailureReason> {
        let residue = |detail: String| FailureReason::with_detail(ReasonCode::PhiResidue, detail);
        let location = if nested { " in a sequence item" } else { "" };

        for rule in self.rules.iter() {
            match &rule.action {
                TagAction::Remove => {
                    let present = dicom::contains(set, rule.tag)
                        .map_err(|e| residue(format!("{}: cannot evaluate: {}", rule.label(), e)))?;
                    if present {
                        return Err(residue(format!("{} is present{}", rule.label(), location)));
                    }
                }
                TagAction::Replace(expected) => {
                    let expected = dicom::strip_padding(expected);
                    match dicom::text_value(set, rule.tag) {
                        Ok(Some(actual)) if actual == expected => {}
                        // the actual value may itself be PHI, so it is never echoed
                        Ok(Some(_)) => {
                            return Err(residue(format!(
                                "{} does not carry the replacement value{}",
                                rule.label(),
                                location
                            )))
                        }
                        Ok(None) if nested => {}
                        Ok(None) => {
                            return Err(residue(format!(
                                "{} is missing its replacement value",
                                rule.label()
                            )))
                        }
                        Err(e) => {
                            return Err(residue(format!(
                                "{}: cannot evaluate: {}",
                                rule.label(),
                                e
                            )))
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::dicom::fixtures;
    use crate::anonymization::rules::compile;
    use crate::config::ReplaceTag;
    use crate::domain::Outcome;
    use dicom_core::{Tag, VR};
    use std::path::PathBuf;

    fn rules() -> Arc<RuleSet> {
        Arc::new(
            compile(
                &["PatientID".to_string()],
                &[],
                &[ReplaceTag::new("InstitutionName", "ANONYMOUS_INSTITUTION")],
            )
            .unwrap(),
        )
    }

    fn validator(config: ValidationConfig) -> Validator {
        Validator::new(config, 0o600, rules())
    }

    #[cfg(unix)]
    fn chmod(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    fn write_output(dir: &Path, name: &str, elements: &[(Tag, VR, &str)]) -> PathBuf {
        let path = dir.join(name);
        fixtures::write(&path, "1.2.3.4.5", elements);
        #[cfg(unix)]
        chmod(&path, 0o600);
        path
    }

    fn result_for(path: &Path) -> ProcessingResult {
        ProcessingResult::success("/in/x.dcm", path)
    }

    #[test]
    fn test_clean_output_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(
            dir.path(),
            "a.dcm",
            &[(Tag(0x0008, 0x0080), VR::LO, "ANONYMOUS_INSTITUTION")],
        );
        let result = validator(ValidationConfig::default()).validate(result_for(&path));
        assert_eq!(result.outcome, Outcome::Success);
    }

    #[test]
    fn test_remove_tag_present_is_residue() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(
            dir.path(),
            "a.dcm",
            &[
                (Tag(0x0008, 0x0080), VR::LO, "ANONYMOUS_INSTITUTION"),
                (Tag(0x0010, 0x0020), VR::LO, "MRN-1"),
            ],
        );
        let result = validator(ValidationConfig::default()).validate(result_for(&path));
        assert_eq!(result.outcome, Outcome::QuarantinedValidationFailure);
        let failure = result.failure.unwrap();
        assert_eq!(failure.code, ReasonCode::PhiResidue);
        assert!(failure.detail.unwrap().contains("(0010,0020) PatientID"));
    }

    #[test]
    fn test_remove_tag_in_sequence_item_is_residue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested.dcm");
        fixtures::write_nested(
            &path,
            "1.2.3.4.5",
            &[(Tag(0x0008, 0x0080), VR::LO, "ANONYMOUS_INSTITUTION")],
            Tag(0x0008, 0x1120),
            &[(Tag(0x0010, 0x0020), VR::LO, "MRN-SECRET")],
        );
        #[cfg(unix)]
        chmod(&path, 0o600);

        let result = validator(ValidationConfig::default()).validate(result_for(&path));
        assert_eq!(result.outcome, Outcome::QuarantinedValidationFailure);
        let detail = result.failure.unwrap().detail.unwrap();
        assert!(detail.contains("(0010,0020) PatientID is present in a sequence item"));
        assert!(!detail.contains("MRN-SECRET"));
    }

    #[test]
    fn test_nested_replacement_must_carry_value_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let top = [(Tag(0x0008, 0x0080), VR::LO, "ANONYMOUS_INSTITUTION")];

        let absent = dir.path().join("absent.dcm");
        fixtures::write_nested(
            &absent,
            "1.2.3.4.5",
            &top,
            Tag(0x0008, 0x1110),
            &[(Tag(0x0008, 0x1150), VR::UI, "1.2.840.10008.3.1.2.3.1")],
        );
        let leaked = dir.path().join("leaked.dcm");
        fixtures::write_nested(
            &leaked,
            "1.2.3.4.6",
            &top,
            Tag(0x0008, 0x1110),
            &[(Tag(0x0008, 0x0080), VR::LO, "General Hospital")],
        );
        #[cfg(unix)]
        {
            chmod(&absent, 0o600);
            chmod(&leaked, 0o600);
        }

        let validator = validator(ValidationConfig::default());
        assert!(validator.validate(result_for(&absent)).is_success());
        let failure = validator.validate(result_for(&leaked)).failure.unwrap();
        assert_eq!(failure.code, ReasonCode::PhiResidue);
        assert!(!failure.detail.unwrap().contains("General Hospital"));
    }

    #[test]
    fn test_wrong_replacement_value_is_residue_without_echo() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(
            dir.path(),
            "b.dcm",
            &[(Tag(0x0008, 0x0080), VR::LO, "General Hospital")],
        );
        let result = validator(ValidationConfig::default()).validate(result_for(&path));
        let failure = result.failure.unwrap();
        assert_eq!(failure.code, ReasonCode::PhiResidue);
        let detail = failure.detail.unwrap();
        assert!(detail.contains("InstitutionName"));
        assert!(!detail.contains("General Hospital"));
    }

    #[test]
    fn test_missing_replacement_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(dir.path(), "c.dcm", &[]);
        let result = validator(ValidationConfig::default()).validate(result_for(&path));
        assert_eq!(result.failure.unwrap().code, ReasonCode::PhiResidue);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_checked_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(dir.path(), "d.dcm", &[(Tag(0x0010, 0x0020), VR::LO, "MRN")]);
        chmod(&path, 0o644);
        let result = validator(ValidationConfig::default()).validate(result_for(&path));
        let failure = result.failure.unwrap();
        assert_eq!(failure.code, ReasonCode::Permissions);
        assert_eq!(failure.detail.as_deref(), Some("mode 644, expected 600"));
    }

    #[test]
    fn test_garbage_output_fails_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.dcm");
        std::fs::write(&path, b"DICM? no").unwrap();
        #[cfg(unix)]
        chmod(&path, 0o600);

        let result = validator(ValidationConfig::default()).validate(result_for(&path));
        assert_eq!(result.failure.unwrap().code, ReasonCode::Integrity);
    }

    #[test]
    fn test_phi_check_disabled_still_checks_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let config = ValidationConfig {
            phi_check: false,
            ..ValidationConfig::default()
        };

        let leaky = write_output(dir.path(), "f.dcm", &[(Tag(0x0010, 0x0020), VR::LO, "MRN")]);
        assert!(validator(config).validate(result_for(&leaky)).is_success());

        let garbage = dir.path().join("g.dcm");
        std::fs::write(&garbage, b"junk").unwrap();
        #[cfg(unix)]
        chmod(&garbage, 0o600);
        let result = validator(config).validate(result_for(&garbage));
        assert_eq!(result.failure.unwrap().code, ReasonCode::Integrity);
    }

    #[test]
    fn test_verify_after_write_disabled_skips_everything() {
        let config = ValidationConfig {
            verify_after_write: false,
            ..ValidationConfig::default()
        };
        let result = validator(config).validate(result_for(Path::new("/nonexistent/out.dcm")));
        assert!(result.is_success());
    }

    #[test]
    fn test_non_success_results_untouched() {
        let result = ProcessingResult::engine_failure(
            "/in/x.dcm",
            FailureReason::new(ReasonCode::EngineExit),
        );
        let validated = validator(ValidationConfig::default()).validate(result.clone());
        assert_eq!(validated, result);
    }
}
