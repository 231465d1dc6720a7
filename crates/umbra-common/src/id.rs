//! Node, patch, and session identity types.
//!
//! Nodes belong to the host tree; the core only ever holds a [`NodeId`], an
//! opaque handle that may dangle once the host drops the node. Everything the
//! core creates itself (patches, sessions) gets a generated identifier.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Weak handle into the host's live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// Identifier of a synthesized patch.
///
/// Format: `patch-<date>-<time>-<random>`
/// Example: `patch-20260115-143022-3f9a1c0b`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(pub String);

impl PatchId {
    /// Generate a new patch ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect();
        PatchId(format!("patch-{}-{}", now.format("%Y%m%d-%H%M%S"), random))
    }

    /// Parse an existing patch ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with("patch-") && s.len() > 6 {
            Some(PatchId(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session ID for one page instance.
///
/// Format: `sess-<date>-<time>-<random>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new session ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .to_string()
            .chars()
            .take(6)
            .collect();
        SessionId(format!(
            "sess-{}-{}",
            now.format("%Y%m%d-%H%M%S"),
            random
        ))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hash of an issue, stable across scan cycles.
///
/// `hash(identity_path || signature_key)`. Timestamps and sampled style
/// values are deliberately not part of the hash, so the same defect on the
/// same node fingerprints identically on every cycle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueFingerprint(pub String);

impl IssueFingerprint {
    pub fn compute(identity_path: &str, signature_key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(identity_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(signature_key.as_bytes());
        IssueFingerprint(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for IssueFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}
