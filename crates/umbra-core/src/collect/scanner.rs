//! Tree scanner: walks a subtree and materializes style snapshots.

use super::snapshot::{ClassificationError, StyleSnapshot};
use crate::host::{identity_path, HostError, HostTree};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use umbra_common::NodeId;

/// Options for a single scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Include nodes that already carry an active patch.
    pub force_revalidate: bool,
    /// Stop after visiting this many nodes.
    pub max_nodes: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            force_revalidate: false,
            max_nodes: 5_000,
        }
    }
}

/// Per-scan accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub visited: usize,
    pub snapshotted: usize,
    pub skipped_zero_box: usize,
    pub skipped_marked: usize,
    pub skipped_unreadable: usize,
    /// The node budget ran out before the subtree was exhausted.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub snapshots: Vec<StyleSnapshot>,
    /// Every node visited, snapshotted or not.
    pub visited_nodes: Vec<NodeId>,
    pub report: ScanReport,
}

/// Stateless subtree walker. Pure read; safe to call repeatedly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeScanner;

impl TreeScanner {
    pub fn new() -> Self {
        Self
    }

    /// Snapshot `root` and every node below it.
    pub fn scan(&self, host: &dyn HostTree, root: NodeId, options: ScanOptions) -> ScanOutput {
        let viewport = host.viewport();
        let mut out = ScanOutput::default();

        let nodes = std::iter::once(root).chain(host.descendants(root));
        for node in nodes {
            if out.report.visited >= options.max_nodes {
                out.report.truncated = true;
                break;
            }
            out.report.visited += 1;
            out.visited_nodes.push(node);

            if !options.force_revalidate && host.has_marker(node) {
                out.report.skipped_marked += 1;
                continue;
            }

            match self.snapshot_node(host, node, viewport) {
                Ok(Some(snapshot)) => {
                    out.report.snapshotted += 1;
                    out.snapshots.push(snapshot);
                }
                Ok(None) => out.report.skipped_zero_box += 1,
                Err(err) => {
                    warn!(node = %node, error = %err, "skipping unreadable node");
                    out.report.skipped_unreadable += 1;
                }
            }
        }

        debug!(
            root = %root,
            visited = out.report.visited,
            snapshotted = out.report.snapshotted,
            truncated = out.report.truncated,
            "scan complete"
        );
        out
    }

    fn snapshot_node(
        &self,
        host: &dyn HostTree,
        node: NodeId,
        viewport: crate::host::Viewport,
    ) -> Result<Option<StyleSnapshot>, ClassificationError> {
        let bbox = host.bounding_box(node).map_err(|e| unreadable(node, e))?;
        if bbox.is_empty() {
            return Ok(None);
        }
        let style = host.computed_style(node).map_err(|e| unreadable(node, e))?;
        let info = host.element_info(node).map_err(|e| unreadable(node, e))?;
        StyleSnapshot::from_parts(node, &style, &bbox, &info, viewport, identity_path(host, node))
            .map(Some)
    }
}

fn unreadable(node: NodeId, err: HostError) -> ClassificationError {
    ClassificationError::Unreadable {
        node,
        reason: err.to_string(),
    }
}
