//! Per-run session context
//!
//! Everything that used to be process-wide state (the compiled rules, the
//! audit key, the session identity) lives here and is passed explicitly.

use crate::anonymization::rules::RuleSet;
use crate::security::{AuditCipher, EncryptionKey};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// One anonymization run
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier, written into every audit header
    pub id: Uuid,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Compiled, immutable rule set
    pub rules: Arc<RuleSet>,

    /// Cipher over the audit key
    pub cipher: AuditCipher,

    /// Non-secret identifier of the audit key
    pub key_id: String,
}

impl Session {
    /// Starts a session over compiled rules and the audit key
    pub fn start(rules: Arc<RuleSet>, key: &EncryptionKey) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            rules,
            cipher: AuditCipher::new(key),
            key_id: key.key_id(),
        };
        tracing::info!(
            session_id = %session.id,
            rules = session.rules.len(),
            fingerprint = %session.fingerprint(),
            key_id = %session.key_id,
            "Session started"
        );
        session
    }

    /// Fingerprint of the session rule set
    pub fn fingerprint(&self) -> String {
        self.rules.fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnonymizationConfig;

    #[test]
    fn test_sessions_are_distinct() {
        let key = EncryptionKey::generate();
        let rules = Arc::new(RuleSet::compile(&AnonymizationConfig::default()).unwrap());
        let a = Session::start(Arc::clone(&rules), &key);
        let b = Session::start(rules, &key);
        assert_ne!(a.id, b.id);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.key_id, b.key_id);
    }
}
