//! Key management and audit encryption
//!
//! - [`KeyManager`] loads or creates the single audit key
//! - [`AuditCipher`] seals audit payloads with AES-256-GCM

pub mod cipher;
pub mod key;

pub use cipher::{AuditCipher, Sealed};
pub use key::{EncryptionKey, KeyManager, KEY_LEN};
