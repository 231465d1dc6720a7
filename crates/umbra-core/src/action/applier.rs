//! Patch application against the host tree.
//!
//! Each node carries at most one active patch, held in a style block whose
//! id is derived from the node. Re-applying the same signature is a no-op;
//! applying a different one overwrites the block in place.

use crate::host::{HostError, HostTree};
use crate::synth::Patch;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};
use umbra_common::{NodeId, PatchId};

/// Prefix of every style block this applier owns.
pub const BLOCK_PREFIX: &str = "umbra-patch-";

pub fn block_id(node: NodeId) -> String {
    format!("{}{}", BLOCK_PREFIX, node)
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("host rejected patch for node {node}: {reason}")]
    Rejected { node: NodeId, reason: String },

    #[error("node {0} is no longer attached")]
    Detached(NodeId),
}

impl ApplyError {
    fn from_host(node: NodeId, err: HostError) -> Self {
        match err {
            HostError::Detached(n) => ApplyError::Detached(n),
            HostError::Rejected { reason, .. } => ApplyError::Rejected { node, reason },
            other => ApplyError::Rejected {
                node,
                reason: other.to_string(),
            },
        }
    }
}

impl From<ApplyError> for umbra_common::Error {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Rejected { node, reason } => umbra_common::Error::Apply {
                node: node.to_string(),
                reason,
            },
            ApplyError::Detached(node) => umbra_common::Error::Apply {
                node: node.to_string(),
                reason: "node detached".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    AlreadyApplied { active: PatchId },
    Replaced { previous: PatchId },
}

/// Registry entry for the patch currently live on a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivePatch {
    pub patch_id: PatchId,
    pub signature_key: String,
    pub css: String,
    pub block_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisableReport {
    pub removed: usize,
    pub failed: Vec<(NodeId, String)>,
    pub mode_marker_cleared: bool,
}

impl DisableReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.mode_marker_cleared
    }
}

#[derive(Debug, Default)]
pub struct PatchApplier {
    active: BTreeMap<NodeId, ActivePatch>,
}

impl PatchApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_for(&self, node: NodeId) -> Option<&ActivePatch> {
        self.active.get(&node)
    }

    pub fn active(&self) -> impl Iterator<Item = (&NodeId, &ActivePatch)> {
        self.active.iter()
    }

    /// Set the top-level mode marker.
    pub fn enable_mode(&self, host: &mut dyn HostTree) -> Result<(), ApplyError> {
        host.set_mode_marker(true)
            .map_err(|e| ApplyError::from_host(host.root(), e))
    }

    /// Insert or replace the style block for `node`.
    ///
    /// On failure the host and registry are left as they were.
    pub fn apply(&mut self, host: &mut dyn HostTree, patch: &Patch, node: NodeId) -> Result<ApplyOutcome, ApplyError> {
        let signature_key = patch.signature.key();
        let previous = self.active.get(&node).cloned();
        if let Some(active) = &previous {
            if active.signature_key == signature_key && host.has_marker(node) {
                debug!(node = %node, patch = %active.patch_id, "patch already active");
                return Ok(ApplyOutcome::AlreadyApplied {
                    active: active.patch_id.clone(),
                });
            }
        }

        let block = block_id(node);
        let css = patch.css();
        host.insert_style_block(&block, &css)
            .map_err(|e| ApplyError::from_host(node, e))?;

        if let Err(err) = host.set_marker(node, true) {
            let rollback = match &previous {
                Some(prev) => host.insert_style_block(&block, &prev.css),
                None => host.remove_style_block(&block),
            };
            if let Err(rollback_err) = rollback {
                warn!(node = %node, error = %rollback_err, "rollback of style block failed");
            }
            return Err(ApplyError::from_host(node, err));
        }

        self.active.insert(
            node,
            ActivePatch {
                patch_id: patch.id.clone(),
                signature_key,
                css,
                block_id: block,
            },
        );

        let outcome = match previous {
            Some(prev) => ApplyOutcome::Replaced {
                previous: prev.patch_id,
            },
            None => ApplyOutcome::Applied,
        };
        info!(
            target: "umbra::apply",
            node = %node,
            patch = %patch.id,
            source = %patch.source_kind,
            outcome = ?outcome,
            "patch applied"
        );
        Ok(outcome)
    }

    /// Remove the style block and marker for `node`. Returns the removed patch.
    pub fn remove(&mut self, host: &mut dyn HostTree, node: NodeId) -> Result<Option<PatchId>, ApplyError> {
        let Some(active) = self.active.get(&node) else {
            return Ok(None);
        };
        host.remove_style_block(&active.block_id)
            .map_err(|e| ApplyError::from_host(node, e))?;
        match host.set_marker(node, false) {
            Ok(()) | Err(HostError::Detached(_)) => {}
            Err(e) => return Err(ApplyError::from_host(node, e)),
        }
        let removed = self.active.remove(&node).map(|a| a.patch_id);
        debug!(node = %node, "patch removed");
        Ok(removed)
    }

    /// Remove every active patch and the mode marker.
    ///
    /// Failures are collected; entries that could not be removed stay in
    /// the registry so a later call can retry them.
    pub fn disable_all(&mut self, host: &mut dyn HostTree) -> DisableReport {
        let mut report = DisableReport::default();
        let nodes: Vec<NodeId> = self.active.keys().copied().collect();
        for node in nodes {
            match self.remove(host, node) {
                Ok(Some(_)) => report.removed += 1,
                Ok(None) => {}
                Err(err) => report.failed.push((node, err.to_string())),
            }
        }
        match host.set_mode_marker(false) {
            Ok(()) => report.mode_marker_cleared = true,
            Err(err) => report.failed.push((host.root(), err.to_string())),
        }
        info!(
            removed = report.removed,
            failed = report.failed.len(),
            "patches disabled"
        );
        report
    }

    /// Remove the blocks of patches whose node left the tree.
    ///
    /// Entries whose block cannot be removed stay registered for a retry.
    pub fn release_detached(&mut self, host: &mut dyn HostTree) -> usize {
        let detached: Vec<NodeId> = self
            .active
            .keys()
            .copied()
            .filter(|node| matches!(host.element_info(*node), Err(HostError::Detached(_))))
            .collect();
        let mut released = 0;
        for node in detached {
            match self.remove(host, node) {
                Ok(Some(_)) => released += 1,
                Ok(None) => {}
                Err(err) => warn!(node = %node, error = %err, "detached patch not released"),
            }
        }
        released
    }
}
