//! DICOM file access
//!
//! Thin wrappers over `dicom-object` shared by the built-in engine and the
//! validator. Errors are returned as diagnostic strings because callers turn
//! them into per-file outcomes, never into process errors.

use crate::domain::TagAddress;
use dicom_core::header::Header;
use dicom_object::{open_file, DefaultDicomObject, InMemDicomObject};
use std::path::Path;

/// Summary of the Part-10 file meta group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetaSummary {
    /// Transfer syntax UID
    pub transfer_syntax: String,

    /// Media storage SOP instance UID
    pub sop_instance_uid: String,
}

/// Opens a Part-10 DICOM file
pub fn open(path: &Path) -> Result<DefaultDicomObject, String> {
    open_file(path).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Strips DICOM value padding (trailing spaces and NULs, leading spaces)
pub fn strip_padding(value: &str) -> &str {
    value
        .trim_end_matches(|c| c == ' ' || c == '\0')
        .trim_start_matches(' ')
}

/// Reads the file meta group, requiring a transfer syntax and SOP instance UID
pub fn file_meta(obj: &DefaultDicomObject) -> Result<FileMetaSummary, String> {
    let meta = obj.meta();
    let transfer_syntax = strip_padding(&meta.transfer_syntax).to_string();
    let sop_instance_uid = strip_padding(&meta.media_storage_sop_instance_uid).to_string();

    if transfer_syntax.is_empty() {
        return Err("file meta group has no transfer syntax".to_string());
    }
    if sop_instance_uid.is_empty() {
        return Err("file meta group has no SOP instance UID".to_string());
    }

    Ok(FileMetaSummary {
        transfer_syntax,
        sop_instance_uid,
    })
}

/// Whether an attribute is present in a data set (top level or nested item)
pub fn contains(obj: &InMemDicomObject, tag: TagAddress) -> Result<bool, String> {
    obj.element_opt(tag.into())
        .map(|elem| elem.is_some())
        .map_err(|e| format!("cannot access {tag}: {e}"))
}

/// Reads an attribute of a data set as text with padding stripped
///
/// Returns `Ok(None)` when the attribute is absent and `Err` when it is
/// present but has no textual value (e.g. a sequence).
pub fn text_value(obj: &InMemDicomObject, tag: TagAddress) -> Result<Option<String>, String> {
    let Some(elem) = obj
        .element_opt(tag.into())
        .map_err(|e| format!("cannot access {tag}: {e}"))?
    else {
        return Ok(None);
    };

    elem.to_str()
        .map(|value| Some(strip_padding(&value).to_string()))
        .map_err(|e| format!("cannot read {tag} as text: {e}"))
}

/// Data sets nested in the sequences of `obj`, at every depth
///
/// The top-level data set itself is not included.
pub fn nested_items(obj: &InMemDicomObject) -> Vec<&InMemDicomObject> {
    let mut found = Vec::new();
    let mut pending: Vec<&InMemDicomObject> = vec![obj];
    while let Some(set) = pending.pop() {
        for elem in set.iter() {
            if let Some(items) = elem.items() {
                for item in items {
                    found.push(item);
                    pending.push(item);
                }
            }
        }
    }
    found
}

/// Tags of the sequence attributes directly in `obj`
pub fn sequence_tags(obj: &InMemDicomObject) -> Vec<dicom_core::Tag> {
    obj.iter()
        .filter(|elem| elem.items().is_some())
        .map(|elem| elem.tag())
        .collect()
}
