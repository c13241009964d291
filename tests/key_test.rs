//! Audit key creation and loading

use dicom_deid::domain::DeidError;
use dicom_deid::security::{AuditCipher, KeyManager};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_first_runs_converge_on_one_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config/encryption.key");
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                KeyManager::new(path, 0o700).load_or_create().unwrap().key_id()
            })
        })
        .collect();

    let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "{ids:?}");

    let stored = KeyManager::new(&path, 0o700).load().unwrap();
    assert_eq!(stored.key_id(), ids[0]);

    // no temporary key files left behind
    let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n != "encryption.key")
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[cfg(unix)]
#[test]
fn test_created_key_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys/encryption.key");
    KeyManager::new(&path, 0o700).load_or_create().unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode();
    assert_eq!(dir_mode & 0o777, 0o700);
}

#[test]
fn test_existing_key_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let manager = KeyManager::new(dir.path().join("encryption.key"), 0o700);

    let created = manager.load_or_create().unwrap();
    let loaded = manager.load_or_create().unwrap();
    assert_eq!(created.key_id(), loaded.key_id());

    // a record sealed under one load opens under the other
    let sealed = AuditCipher::new(&created).seal(b"aad", b"payload").unwrap();
    assert_eq!(
        AuditCipher::new(&loaded).open(b"aad", &sealed).unwrap(),
        b"payload"
    );
}

#[test]
fn test_corrupt_key_is_never_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encryption.key");
    fs::write(&path, "not base64 at all!").unwrap();

    let err = KeyManager::new(&path, 0o700).load_or_create().unwrap_err();
    assert!(matches!(err, DeidError::KeyCorrupt(_)));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(fs::read_to_string(&path).unwrap(), "not base64 at all!");
}

#[test]
fn test_short_key_is_corrupt() {
    use base64::Engine as _;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encryption.key");
    fs::write(&path, base64::engine::general_purpose::STANDARD.encode([7u8; 16])).unwrap();

    let err = KeyManager::new(&path, 0o700).load().unwrap_err();
    assert!(matches!(err, DeidError::KeyCorrupt(_)));
}

#[test]
fn test_missing_key_is_unavailable_for_load() {
    let dir = tempfile::tempdir().unwrap();
    let err = KeyManager::new(dir.path().join("absent.key"), 0o700)
        .load()
        .unwrap_err();
    assert!(matches!(err, DeidError::KeyUnavailable(_)));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_unwritable_key_location_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("config");
    fs::write(&blocker, b"a file, not a directory").unwrap();
    let path = blocker.join("encryption.key");

    let err = KeyManager::new(&path, 0o700).load_or_create().unwrap_err();
    assert!(matches!(err, DeidError::KeyUnavailable(_)));
    assert_eq!(err.exit_code(), 3);
    assert!(!path.exists());
    assert_eq!(fs::read(&blocker).unwrap(), b"a file, not a directory");
}
