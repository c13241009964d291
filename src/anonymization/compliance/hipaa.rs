//! HIPAA Safe Harbor baseline tag list
//!
//! The attributes below carry one of the Safe Harbor identifiers
//! (45 CFR §164.514(b)(2)) in ordinary DICOM headers. They are the default
//! value of `anonymization.hipaa_tags` and are always removed.

use serde::Serialize;
use std::fmt;

/// Safe Harbor identifier category an attribute falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeHarborIdentifier {
    /// Names of the patient, relatives or staff
    Name,
    /// Geographic subdivisions smaller than a state
    GeographicLocation,
    /// Dates directly related to the individual
    Date,
    /// Telephone numbers
    Phone,
    /// Medical record numbers
    MedicalRecordNumber,
    /// Account numbers
    AccountNumber,
    /// Device identifiers and serial numbers
    DeviceIdentifier,
    /// Any other unique identifying number or code
    UniqueIdentifier,
}

impl fmt::Display for SafeHarborIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::GeographicLocation => "geographic_location",
            Self::Date => "date",
            Self::Phone => "phone",
            Self::MedicalRecordNumber => "medical_record_number",
            Self::AccountNumber => "account_number",
            Self::DeviceIdentifier => "device_identifier",
            Self::UniqueIdentifier => "unique_identifier",
        };
        f.write_str(s)
    }
}

/// Baseline keywords with their Safe Harbor category
pub const SAFE_HARBOR_TAGS: &[(&str, SafeHarborIdentifier)] = &[
    ("PatientName", SafeHarborIdentifier::Name),
    ("PatientID", SafeHarborIdentifier::MedicalRecordNumber),
    ("PatientBirthDate", SafeHarborIdentifier::Date),
    ("PatientBirthTime", SafeHarborIdentifier::Date),
    ("PatientSex", SafeHarborIdentifier::UniqueIdentifier),
    ("PatientAddress", SafeHarborIdentifier::GeographicLocation),
    ("PatientTelephoneNumbers", SafeHarborIdentifier::Phone),
    ("OtherPatientNames", SafeHarborIdentifier::Name),
    ("OtherPatientIDsSequence", SafeHarborIdentifier::MedicalRecordNumber),
    ("PatientMotherBirthName", SafeHarborIdentifier::Name),
    ("InstitutionName", SafeHarborIdentifier::GeographicLocation),
    ("InstitutionAddress", SafeHarborIdentifier::GeographicLocation),
    ("InstitutionalDepartmentName", SafeHarborIdentifier::GeographicLocation),
    ("ReferringPhysicianName", SafeHarborIdentifier::Name),
    ("ReferringPhysicianAddress", SafeHarborIdentifier::GeographicLocation),
    ("ReferringPhysicianTelephoneNumbers", SafeHarborIdentifier::Phone),
    ("PhysiciansOfRecord", SafeHarborIdentifier::Name),
    ("PerformingPhysicianName", SafeHarborIdentifier::Name),
    ("NameOfPhysiciansReadingStudy", SafeHarborIdentifier::Name),
    ("OperatorsName", SafeHarborIdentifier::Name),
    ("AccessionNumber", SafeHarborIdentifier::AccountNumber),
    ("StudyID", SafeHarborIdentifier::UniqueIdentifier),
    ("StationName", SafeHarborIdentifier::DeviceIdentifier),
    ("DeviceSerialNumber", SafeHarborIdentifier::DeviceIdentifier),
];

/// Default `anonymization.hipaa_tags`
pub fn default_tag_names() -> Vec<String> {
    SAFE_HARBOR_TAGS
        .iter()
        .map(|(keyword, _)| (*keyword).to_string())
        .collect()
}

/// Safe Harbor category of a baseline keyword
pub fn identifier_for(keyword: &str) -> Option<SafeHarborIdentifier> {
    SAFE_HARBOR_TAGS
        .iter()
        .find(|(k, _)| *k == keyword)
        .map(|(_, category)| *category)
}
