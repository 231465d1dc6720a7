//! Point-in-time record of the effective policy.
//!
//! Attached to store exports so an import can tell which thresholds produced
//! the ledger it is replaying.

use crate::policy::Policy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Where the effective policy was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    Explicit(PathBuf),
    Environment(PathBuf),
    UserConfig(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Explicit(p) => write!(f, "explicit ({})", p.display()),
            ConfigSource::Environment(p) => write!(f, "environment ({})", p.display()),
            ConfigSource::UserConfig(p) => write!(f, "user config ({})", p.display()),
            ConfigSource::Defaults => f.write_str("built-in defaults"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub source: ConfigSource,
    /// SHA-256 of the canonical policy JSON.
    pub policy_hash: String,
    pub captured_at: DateTime<Utc>,
    pub policy: Policy,
}

impl ConfigSnapshot {
    pub fn capture(policy: &Policy, source: ConfigSource) -> Self {
        Self {
            source,
            policy_hash: policy_hash(policy),
            captured_at: Utc::now(),
            policy: policy.clone(),
        }
    }

    /// Whether `policy` is the one this snapshot was taken from.
    pub fn matches(&self, policy: &Policy) -> bool {
        self.policy_hash == policy_hash(policy)
    }
}

/// Hex SHA-256 over the compact JSON form of a policy.
pub fn policy_hash(policy: &Policy) -> String {
    let canonical = serde_json::to_vec(policy).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = Policy::default();
        let mut b = Policy::default();
        assert_eq!(policy_hash(&a), policy_hash(&b));
        b.monitor.debounce_ms += 1;
        assert_ne!(policy_hash(&a), policy_hash(&b));
        assert_eq!(policy_hash(&a).len(), 64);
    }

    #[test]
    fn snapshot_matches_its_policy() {
        let policy = Policy::default();
        let snap = ConfigSnapshot::capture(&policy, ConfigSource::Defaults);
        assert!(snap.matches(&policy));
        let json = serde_json::to_string(&snap).unwrap();
        let back: ConfigSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
