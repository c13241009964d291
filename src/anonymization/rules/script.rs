//! Rule script rendering for external engines
//!
//! Format, one rule per line after a `#` header:
//!
//! ```text
//! # dicom-deid rule script
//! # rules: 2
//! # fingerprint: sha256:<hex>
//! replace (0008,0080) InstitutionName "ANONYMOUS_INSTITUTION"
//! remove (0010,0020) PatientID
//! ```

use super::compiler::RuleSet;
use crate::domain::{DeidError, Result, TagAction, TagRule};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Renders one rule
pub fn render_rule(rule: &TagRule) -> String {
    let mut line = format!("{} {}", rule.action.name(), rule.tag);
    if let Some(keyword) = &rule.keyword {
        line.push(' ');
        line.push_str(keyword);
    }
    if let TagAction::Replace(value) = &rule.action {
        line.push(' ');
        // JSON string escaping keeps quotes, backslashes and control
        // characters on one line.
        line.push_str(&serde_json::Value::String(value.clone()).to_string());
    }
    line
}

/// Rule lines without the header
pub fn rule_lines(rules: &RuleSet) -> Vec<String> {
    rules.iter().map(render_rule).collect()
}

/// Renders the full script
pub fn render_script(rules: &RuleSet) -> String {
    let lines = rule_lines(rules);
    let mut script = String::new();
    script.push_str("# dicom-deid rule script\n");
    script.push_str(&format!("# rules: {}\n", lines.len()));
    script.push_str(&format!("# fingerprint: sha256:{}\n", rules.fingerprint()));
    for line in lines {
        script.push_str(&line);
        script.push('\n');
    }
    script
}

/// Writes the script to `path`, creating parent directories
///
/// The file is written beside its final location and renamed into place so
/// an engine never reads a half-written script.
///
/// # Errors
///
/// Returns [`DeidError::Engine`] if the script cannot be written
pub fn write_script(rules: &RuleSet, path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| {
        DeidError::Engine(format!(
            "Failed to create script directory {}: {}",
            parent.display(),
            e
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
        DeidError::Engine(format!("Failed to stage rule script in {}: {}", parent.display(), e))
    })?;
    temp.write_all(render_script(rules).as_bytes())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| DeidError::Engine(format!("Failed to write rule script: {}", e)))?;
    temp.persist(path).map_err(|e| {
        DeidError::Engine(format!(
            "Failed to write rule script {}: {}",
            path.display(),
            e.error
        ))
    })?;

    tracing::info!(
        path = %path.display(),
        rules = rules.len(),
        fingerprint = %rules.fingerprint(),
        "Rule script written"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymization::rules::compiler::compile;
    use crate::config::ReplaceTag;
    use crate::domain::TagAddress;

    #[test]
    fn test_render_remove_rule() {
        let rule = TagRule::remove(TagAddress::new(0x0010, 0x0020), Some("PatientID".into()));
        assert_eq!(render_rule(&rule), "remove (0010,0020) PatientID");
    }

    #[test]
    fn test_render_replace_rule_escapes_value() {
        let rule = TagRule::replace(
            TagAddress::new(0x0008, 0x0080),
            Some("InstitutionName".into()),
            "St. \"Mary\"\n",
        );
        assert_eq!(
            render_rule(&rule),
            r#"replace (0008,0080) InstitutionName "St. \"Mary\"\n""#
        );
    }

    #[test]
    fn test_render_script_header() {
        let rules = compile(
            &["PatientID".to_string()],
            &[],
            &[ReplaceTag::new("InstitutionName", "ANONYMOUS_INSTITUTION")],
        )
        .unwrap();
        let script = render_script(&rules);
        let lines: Vec<_> = script.lines().collect();
        assert_eq!(lines[1], "# rules: 2");
        assert!(lines[2].starts_with("# fingerprint: sha256:"));
        assert_eq!(
            lines[3],
            "replace (0008,0080) InstitutionName \"ANONYMOUS_INSTITUTION\""
        );
        assert_eq!(lines[4], "remove (0010,0020) PatientID");
    }

    #[test]
    fn test_write_script_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("anonymization.script");
        let rules = compile(&["PatientName".to_string()], &[], &[]).unwrap();

        write_script(&rules, &path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_script(&rules));
    }
}
