//! Keyword lookups against the standard DICOM data dictionary

use crate::domain::TagAddress;
use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry, TagRange, VirtualVr};
use dicom_core::VR;
use dicom_dictionary_std::StandardDataDictionary;

/// Resolves a keyword such as `PatientName` to its single tag
///
/// Repeating-group and ranged entries do not resolve, since a rule must
/// name exactly one attribute.
pub fn resolve_keyword(keyword: &str) -> Option<TagAddress> {
    let entry = StandardDataDictionary.by_name(keyword.trim())?;
    match entry.tag_range() {
        TagRange::Single(tag) => Some(tag.into()),
        _ => None,
    }
}

/// Standard keyword of a tag, if the dictionary knows it
pub fn keyword_for(tag: TagAddress) -> Option<String> {
    StandardDataDictionary
        .by_tag(tag.into())
        .map(|entry| entry.alias().to_string())
}

/// VR to use when writing a tag that is not yet present
///
/// Falls back to `LO` for tags with an ambiguous or unknown VR.
pub fn default_vr(tag: TagAddress) -> VR {
    match StandardDataDictionary.by_tag(tag.into()).map(|e| e.vr()) {
        Some(VirtualVr::Exact(vr)) => vr,
        _ => VR::LO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_keywords() {
        assert_eq!(resolve_keyword("PatientName"), Some(TagAddress::new(0x0010, 0x0010)));
        assert_eq!(resolve_keyword("InstitutionName"), Some(TagAddress::new(0x0008, 0x0080)));
        assert_eq!(
            resolve_keyword("ReferringPhysicianTelephoneNumbers"),
            Some(TagAddress::new(0x0008, 0x0094))
        );
    }

    #[test]
    fn test_resolve_unknown_keyword() {
        assert_eq!(resolve_keyword("PatientFavouriteColour"), None);
    }

    #[test]
    fn test_keyword_for_tag() {
        assert_eq!(
            keyword_for(TagAddress::new(0x0010, 0x0020)).as_deref(),
            Some("PatientID")
        );
    }

    #[test]
    fn test_default_vr() {
        assert_eq!(default_vr(TagAddress::new(0x0010, 0x0010)), VR::PN);
        assert_eq!(default_vr(TagAddress::new(0x0008, 0x0080)), VR::LO);
    }
}
