//! Rule compilation from configuration through to the rule script

use dicom_deid::anonymization::rules::{render_script, write_script, RuleSet};
use dicom_deid::config::{parse_config, AdditionalTag, AnonymizationConfig, ReplaceTag};
use dicom_deid::domain::{DeidError, TagAction, TagAddress};
use test_case::test_case;

fn anonymization(
    hipaa: &[&str],
    additional: Vec<AdditionalTag>,
    replace: Vec<ReplaceTag>,
) -> AnonymizationConfig {
    AnonymizationConfig {
        hipaa_tags: hipaa.iter().map(|s| s.to_string()).collect(),
        additional_tags: additional,
        replace_tags: replace,
    }
}

#[test]
fn test_default_baseline_compiles() {
    let config = parse_config("").unwrap();
    let rules = RuleSet::compile(&config.anonymization).unwrap();

    assert!(rules.removals().count() >= 20);
    let name = rules.get(TagAddress::new(0x0010, 0x0010)).unwrap();
    assert_eq!(name.action, TagAction::Replace("ANONYMOUS".into()));

    // every default replacement overrides a baseline removal
    assert_eq!(rules.replacements().count(), 3);
    assert_eq!(rules.diagnostics().len(), 3);
}

#[test]
fn test_replacement_beats_removal_in_any_order() {
    let replace = vec![ReplaceTag::new("InstitutionName", "SITE")];
    let first = RuleSet::compile(&anonymization(
        &["InstitutionName", "PatientID"],
        vec![],
        replace.clone(),
    ))
    .unwrap();
    let second = RuleSet::compile(&anonymization(
        &["PatientID"],
        vec![AdditionalTag::named("InstitutionName")],
        replace,
    ))
    .unwrap();

    for rules in [&first, &second] {
        assert_eq!(
            rules.get(TagAddress::new(0x0008, 0x0080)).unwrap().action,
            TagAction::Replace("SITE".into())
        );
    }
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[test]
fn test_last_replacement_wins() {
    let rules = RuleSet::compile(&anonymization(
        &[],
        vec![],
        vec![
            ReplaceTag::new("PatientName", "FIRST"),
            ReplaceTag::new("PatientName", "SECOND"),
        ],
    ))
    .unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(
        rules.get(TagAddress::new(0x0010, 0x0010)).unwrap().action,
        TagAction::Replace("SECOND".into())
    );
    assert_eq!(rules.diagnostics().len(), 1);
    assert!(rules.diagnostics()[0].message.contains("SECOND"));
}

#[test]
fn test_duplicates_collapse_to_one_rule() {
    let rules = RuleSet::compile(&anonymization(
        &["PatientID", "PatientID"],
        vec![
            AdditionalTag::named("PatientID"),
            AdditionalTag::address(0x0010, 0x0020),
        ],
        vec![],
    ))
    .unwrap();

    assert_eq!(rules.len(), 1);
    assert!(rules.diagnostics().is_empty());
}

#[test]
fn test_private_tag_by_address() {
    let rules = RuleSet::compile(&anonymization(
        &[],
        vec![AdditionalTag::address(0x0009, 0x1001)],
        vec![],
    ))
    .unwrap();

    let rule = rules.get(TagAddress::new(0x0009, 0x1001)).unwrap();
    assert_eq!(rule.action, TagAction::Remove);
    assert!(rule.tag.is_private());
}

#[test_case(&["PatientNmae"], vec![], vec![] ; "misspelled baseline keyword")]
#[test_case(&[], vec![AdditionalTag::named("NotAKeyword")], vec![] ; "unknown additional keyword")]
#[test_case(&[], vec![], vec![ReplaceTag::new("Nonsense", "X")] ; "unknown replacement keyword")]
#[test_case(
    &[],
    vec![AdditionalTag { name: Some("PatientID".into()), group: Some(0x0010), element: Some(0x0010) }],
    vec![]
    ; "keyword contradicts address"
)]
fn test_unresolvable_rules_are_rejected(
    hipaa: &[&str],
    additional: Vec<AdditionalTag>,
    replace: Vec<ReplaceTag>,
) {
    let err = RuleSet::compile(&anonymization(hipaa, additional, replace)).unwrap_err();
    assert!(matches!(err, DeidError::Configuration(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_compilation_is_deterministic() {
    let config = parse_config("").unwrap();
    let a = RuleSet::compile(&config.anonymization).unwrap();
    let b = RuleSet::compile(&config.anonymization).unwrap();

    assert_eq!(a, b);
    assert_eq!(render_script(&a), render_script(&b));
}

#[test]
fn test_written_script_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config/anonymization.script");
    let rules = RuleSet::compile(&anonymization(
        &["PatientID"],
        vec![],
        vec![ReplaceTag::new("PatientName", "ANON \"X\"")],
    ))
    .unwrap();

    write_script(&rules, &path).unwrap();
    let first = std::fs::read_to_string(&path).unwrap();
    write_script(&rules, &path).unwrap();
    let second = std::fs::read_to_string(&path).unwrap();

    assert_eq!(first, second);
    assert!(first.contains(&format!("# fingerprint: sha256:{}", rules.fingerprint())));
    assert!(first.contains("replace (0010,0010) PatientName \"ANON \\\"X\\\"\""));
    assert!(first.contains("remove (0010,0020) PatientID"));
}
