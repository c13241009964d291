//! Audit encryption key management
//!
//! One 256-bit key, stored base64-encoded in a file readable only by its
//! owner. The first run creates it; every later run (and every concurrent
//! first run) reads the same key back.

use crate::config::SecurityConfig;
use crate::core::verification::checksum::calculate_checksum_bytes;
use crate::domain::{DeidError, Result};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

/// Key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// The audit-log key
///
/// The bytes are zeroized on drop and never appear in `Debug` output.
pub struct EncryptionKey {
    bytes: Secret<[u8; KEY_LEN]>,
}

impl EncryptionKey {
    /// Wraps raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes: Secret::new(bytes),
        }
    }

    /// Generates a fresh key from the operating system RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        key
    }

    pub(crate) fn expose(&self) -> &[u8; KEY_LEN] {
        self.bytes.expose_secret()
    }

    /// Short identifier safe to log: the first 16 hex digits of SHA-256(key)
    pub fn key_id(&self) -> String {
        calculate_checksum_bytes(self.expose())[..16].to_string()
    }

    fn encode(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.expose())
    }

    fn decode(encoded: &str, path: &Path) -> Result<Self> {
        let mut decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| {
                DeidError::KeyCorrupt(format!("{} is not valid base64: {}", path.display(), e))
            })?;

        if decoded.len() != KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(DeidError::KeyCorrupt(format!(
                "{} holds {} bytes, expected {}",
                path.display(),
                len,
                KEY_LEN
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key_id", &self.key_id())
            .finish()
    }
}

/// Loads or creates the key file
#[derive(Debug, Clone)]
pub struct KeyManager {
    path: PathBuf,
    dir_permissions: u32,
}

impl KeyManager {
    /// Creates a manager for `path`
    pub fn new(path: impl Into<PathBuf>, dir_permissions: u32) -> Self {
        Self {
            path: path.into(),
            dir_permissions,
        }
    }

    /// Creates a manager from `[security]`
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(&config.encryption_key_path, config.dir_permissions)
    }

    /// Key file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads an existing key
    ///
    /// # Errors
    ///
    /// - [`DeidError::KeyUnavailable`] if the file does not exist or cannot be read
    /// - [`DeidError::KeyCorrupt`] if it does not hold base64 of exactly 32 bytes
    pub fn load(&self) -> Result<EncryptionKey> {
        match self.read_existing()? {
            Some(key) => Ok(key),
            None => Err(DeidError::KeyUnavailable(format!(
                "no key at {}",
                self.path.display()
            ))),
        }
    }

    /// Returns the existing key, creating one if none exists
    ///
    /// Creation writes a private temporary file next to the key and
    /// hard-links it into place. If another process links first, its key is
    /// read back instead, so concurrent first runs converge on one key.
    ///
    /// # Errors
    ///
    /// - [`DeidError::KeyUnavailable`] if no key exists and none can be created
    /// - [`DeidError::KeyCorrupt`] if the existing file is malformed
    pub fn load_or_create(&self) -> Result<EncryptionKey> {
        if let Some(key) = self.read_existing()? {
            tracing::debug!(path = %self.path.display(), key_id = %key.key_id(), "Encryption key loaded");
            return Ok(key);
        }

        let key = EncryptionKey::generate();
        match self.persist_new(&key) {
            Ok(()) => {
                tracing::info!(
                    path = %self.path.display(),
                    key_id = %key.key_id(),
                    "Encryption key created"
                );
                Ok(key)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %self.path.display(), "Key created concurrently; reading it back");
                self.load()
            }
            Err(e) => Err(DeidError::KeyUnavailable(format!(
                "cannot create {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn read_existing(&self) -> Result<Option<EncryptionKey>> {
        let mut encoded = match fs::read_to_string(&self.path) {
            Ok(encoded) => encoded,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(DeidError::KeyCorrupt(format!(
                    "{} is not text: {}",
                    self.path.display(),
                    e
                )))
            }
            Err(e) => {
                return Err(DeidError::KeyUnavailable(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        warn_if_exposed(&self.path);
        let key = EncryptionKey::decode(&encoded, &self.path);
        encoded.zeroize();
        key.map(Some)
    }

    fn persist_new(&self, key: &EncryptionKey) -> io::Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        if !parent.exists() {
            fs::create_dir_all(parent)?;
            set_mode(parent, self.dir_permissions)?;
        }

        // tempfile creates the file with mode 0600
        let mut temp = tempfile::Builder::new()
            .prefix(".encryption.key.")
            .tempfile_in(parent)?;
        let mut encoded = key.encode();
        let written = temp
            .write_all(encoded.as_bytes())
            .and_then(|_| temp.as_file().sync_all());
        encoded.zeroize();
        written?;

        // No-clobber: fails with AlreadyExists if another process won the race.
        // The temporary name is removed when `temp` drops.
        fs::hard_link(temp.path(), &self.path)?;

        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mode = meta.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            tracing::warn!(path = %path.display(), mode = format!("{mode:o}"), "Encryption key is readable by group or others");
        }
    }
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path) {}
