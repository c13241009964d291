//! Shared helpers for the integration tests

#![allow(dead_code)]

use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_deid::adapters::dicom;
use dicom_deid::anonymization::audit::{AuditReader, AuditVerification};
use dicom_deid::config::{DeidConfig, ReplaceTag};
use dicom_deid::domain::TagAddress;
use dicom_deid::security::{AuditCipher, KeyManager};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use std::fs;
use std::path::Path;
use tokio::sync::watch;

pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
pub const PATIENT_BIRTH_DATE: Tag = Tag(0x0010, 0x0030);
pub const INSTITUTION_NAME: Tag = Tag(0x0008, 0x0080);
pub const STUDY_DESCRIPTION: Tag = Tag(0x0008, 0x1030);
pub const REFERENCED_PATIENT_SEQUENCE: Tag = Tag(0x0008, 0x1120);

/// Writes a CT Part-10 file carrying the given elements
pub fn write_dicom(path: &Path, sop_instance_uid: &str, elements: &[(Tag, VR, &str)]) {
    save(path, sop_instance_uid, data_set(elements));
}

/// Like [`write_dicom`], adding `sequence` with one item of `item_elements`
pub fn write_nested(
    path: &Path,
    sop_instance_uid: &str,
    elements: &[(Tag, VR, &str)],
    sequence: Tag,
    item_elements: &[(Tag, VR, &str)],
) {
    let mut obj = data_set(elements);
    obj.put(DataElement::new(
        sequence,
        VR::SQ,
        DataSetSequence::from(vec![data_set(item_elements)]),
    ));
    save(path, sop_instance_uid, obj);
}

fn data_set(elements: &[(Tag, VR, &str)]) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    for (tag, vr, value) in elements {
        obj.put(DataElement::new(*tag, *vr, PrimitiveValue::from(*value)));
    }
    obj
}

fn save(path: &Path, sop_instance_uid: &str, mut obj: InMemDicomObject) {
    obj.put(DataElement::new(
        Tag(0x0008, 0x0016),
        VR::UI,
        PrimitiveValue::from(CT_IMAGE_STORAGE),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0018),
        VR::UI,
        PrimitiveValue::from(sop_instance_uid),
    ));

    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LE)
                .media_storage_sop_class_uid(CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_instance_uid),
        )
        .unwrap();
    file.write_to_file(path).unwrap();
}

/// Writes a file with a typical set of identifying attributes
pub fn write_patient_file(path: &Path, sop_instance_uid: &str) {
    write_dicom(
        path,
        sop_instance_uid,
        &[
            (PATIENT_NAME, VR::PN, "Doe^John"),
            (PATIENT_ID, VR::LO, "MRN-0042"),
            (PATIENT_BIRTH_DATE, VR::DA, "19700101"),
            (INSTITUTION_NAME, VR::LO, "General Hospital"),
            (STUDY_DESCRIPTION, VR::LO, "CT CHEST"),
        ],
    );
}

/// Text value of `tag`, or `None` if the element is absent
pub fn read_text(path: &Path, tag: Tag) -> Option<String> {
    let obj = dicom::open(path).unwrap();
    dicom::text_value(&obj, TagAddress::new(tag.0, tag.1)).unwrap()
}

/// Text values of `tag` inside sequence items, at any depth
pub fn read_nested_text(path: &Path, tag: Tag) -> Vec<String> {
    let obj = dicom::open(path).unwrap();
    dicom::nested_items(&obj)
        .into_iter()
        .filter_map(|item| dicom::text_value(item, TagAddress::new(tag.0, tag.1)).unwrap())
        .collect()
}

/// A configuration rooted in `root`, with the input directory created
///
/// Rules: remove PatientID, PatientBirthDate and InstitutionName; replace
/// PatientName with `ANONYMOUS`.
pub fn config(root: &Path) -> DeidConfig {
    let mut config = DeidConfig::default();
    config.application.workers = 2;
    config.directories.input = root.join("data/raw");
    config.directories.output = root.join("data/anonymized");
    config.directories.quarantine = root.join("data/quarantine");
    config.directories.logs = root.join("logs");
    config.directories.audit = root.join("audit_logs");
    config.security.encryption_key_path = root.join("config/encryption.key");
    config.engine.script_path = root.join("config/anonymization.script");
    config.anonymization.hipaa_tags = vec![
        "PatientName".to_string(),
        "PatientID".to_string(),
        "PatientBirthDate".to_string(),
        "InstitutionName".to_string(),
    ];
    config.anonymization.additional_tags = vec![];
    config.anonymization.replace_tags =
        vec![ReplaceTag::new("PatientName", "ANONYMOUS")];
    fs::create_dir_all(&config.directories.input).unwrap();
    config
}

pub fn no_shutdown() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// Decrypts and verifies `path` with the configured key
pub fn verify_audit(config: &DeidConfig, path: &Path) -> AuditVerification {
    let key = KeyManager::from_config(&config.security).load().unwrap();
    AuditReader::new(AuditCipher::new(&key)).verify(path).unwrap()
}

/// File names directly inside `dir`, sorted, sidecars and hidden files excluded
pub fn dicom_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".dcm") && !n.starts_with('.'))
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
