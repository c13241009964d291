//! AES-256-GCM sealing for audit records
//!
//! Each record gets a fresh random 96-bit nonce. The record's plaintext
//! header is bound as associated data, so a header cannot be moved onto
//! another record's ciphertext without failing authentication.

use super::key::EncryptionKey;
use crate::domain::{DeidError, Result};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Base64-encoded nonce and ciphertext (with tag)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// 12-byte nonce
    pub nonce: String,

    /// Ciphertext followed by the 16-byte tag
    pub ciphertext: String,
}

/// Authenticated cipher over the session key
#[derive(Clone)]
pub struct AuditCipher {
    cipher: Aes256Gcm,
}

impl AuditCipher {
    /// Creates a cipher from the audit key
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose())),
        }
    }

    /// Encrypts `plaintext`, authenticating `aad` alongside it
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::AuditWrite`] if encryption fails
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Sealed> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|_| DeidError::AuditWrite("encryption failed".to_string()))?;

        let b64 = base64::engine::general_purpose::STANDARD;
        Ok(Sealed {
            nonce: b64.encode(nonce_bytes),
            ciphertext: b64.encode(ciphertext),
        })
    }

    /// Decrypts and authenticates a sealed payload
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::AuditVerify`] if decoding fails, or if the tag
    /// does not verify (wrong key, tampered ciphertext or header)
    pub fn open(&self, aad: &[u8], sealed: &Sealed) -> Result<Vec<u8>> {
        let b64 = base64::engine::general_purpose::STANDARD;
        let nonce_bytes = b64
            .decode(&sealed.nonce)
            .map_err(|e| DeidError::AuditVerify(format!("invalid nonce encoding: {e}")))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(DeidError::AuditVerify(format!(
                "nonce is {} bytes, expected {}",
                nonce_bytes.len(),
                NONCE_LEN
            )));
        }

        let ciphertext = b64
            .decode(&sealed.ciphertext)
            .map_err(|e| DeidError::AuditVerify(format!("invalid ciphertext encoding: {e}")))?;
        if ciphertext.len() < TAG_LEN {
            return Err(DeidError::AuditVerify("ciphertext too short".to_string()));
        }

        self.cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad,
                },
            )
            .map_err(|_| {
                DeidError::AuditVerify(
                    "authentication failed (wrong key or tampered record)".to_string(),
                )
            })
    }
}

impl std::fmt::Debug for AuditCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuditCipher(AES-256-GCM)")
    }
}
