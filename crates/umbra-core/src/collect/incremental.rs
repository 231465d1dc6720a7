//! Issue-set tracking across scan cycles.
//!
//! Tracks the issues found on each cycle and computes deltas, so the change
//! monitor only runs synthesis when the set of defects actually moved.
//!
//! # Architecture
//!
//! ```text
//! scan + classify ──► IssueTracker::update(issues, scope)
//!                          │
//!                          ├─ APPEARED  → synthesize + apply
//!                          ├─ RESOLVED  → dropped from the inventory
//!                          └─ PERSISTED → nothing to do
//! ```
//!
//! # Identity
//!
//! Issues are keyed by [`IssueFingerprint`]: `hash(identity_path || signature_key)`.
//! Timestamps and sampled style values are not part of the key, so an
//! unchanged defect fingerprints identically on every cycle.

use crate::inference::Issue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use umbra_common::{IssueFingerprint, NodeId};

// ── Delta classification ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    /// Not present in the previous cycle.
    Appeared,
    /// Present before, inside the rescanned region, and gone now.
    Resolved,
    /// Present in both cycles.
    Persisted,
}

#[derive(Debug, Clone)]
pub struct IssueDelta {
    pub fingerprint: IssueFingerprint,
    pub node: NodeId,
    pub kind: DeltaKind,
}

/// Region a cycle covered. Resolution is only inferred inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanScope {
    Full,
    Nodes(HashSet<NodeId>),
}

impl ScanScope {
    pub fn covers(&self, node: NodeId) -> bool {
        match self {
            ScanScope::Full => true,
            ScanScope::Nodes(nodes) => nodes.contains(&node),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub fingerprint: IssueFingerprint,
    pub node: NodeId,
    pub signature_key: String,
    /// Consecutive cycles this issue has been observed.
    pub consecutive_seen: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub total: usize,
    pub appeared: usize,
    pub resolved: usize,
    pub persisted: usize,
}

impl DeltaSummary {
    pub fn from_deltas(deltas: &[IssueDelta]) -> Self {
        let mut summary = DeltaSummary::default();
        for d in deltas {
            match d.kind {
                DeltaKind::Appeared => summary.appeared += 1,
                DeltaKind::Resolved => summary.resolved += 1,
                DeltaKind::Persisted => summary.persisted += 1,
            }
        }
        summary.total = deltas.len();
        summary
    }

    /// The fingerprint set differs from the previous cycle.
    pub fn changed(&self) -> bool {
        self.appeared > 0 || self.resolved > 0
    }
}

// ── Tracker ─────────────────────────────────────────────────────────────

/// Holds the previous cycle's issue inventory.
#[derive(Debug, Default)]
pub struct IssueTracker {
    inventory: HashMap<IssueFingerprint, TrackedIssue>,
    has_baseline: bool,
}

impl IssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inventory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty()
    }

    pub fn has_baseline(&self) -> bool {
        self.has_baseline
    }

    pub fn fingerprints(&self) -> BTreeSet<IssueFingerprint> {
        self.inventory.keys().cloned().collect()
    }

    /// Ingest one cycle's issues and return per-issue deltas.
    ///
    /// On the first call every issue is `Appeared`.
    pub fn update(&mut self, issues: &[Issue], scope: &ScanScope) -> Vec<IssueDelta> {
        let mut deltas = Vec::with_capacity(issues.len());
        let mut seen: HashSet<IssueFingerprint> = HashSet::with_capacity(issues.len());

        for issue in issues {
            let fingerprint = issue.fingerprint();
            if !seen.insert(fingerprint.clone()) {
                continue;
            }

            let kind = if self.inventory.contains_key(&fingerprint) {
                DeltaKind::Persisted
            } else {
                DeltaKind::Appeared
            };
            deltas.push(IssueDelta {
                fingerprint: fingerprint.clone(),
                node: issue.node,
                kind,
            });

            let consecutive = self
                .inventory
                .get(&fingerprint)
                .map(|e| e.consecutive_seen + 1)
                .unwrap_or(1);
            self.inventory.insert(
                fingerprint.clone(),
                TrackedIssue {
                    fingerprint,
                    node: issue.node,
                    signature_key: issue.signature().key(),
                    consecutive_seen: consecutive,
                },
            );
        }

        if self.has_baseline {
            let resolved: Vec<TrackedIssue> = self
                .inventory
                .values()
                .filter(|e| !seen.contains(&e.fingerprint) && scope.covers(e.node))
                .cloned()
                .collect();
            for entry in resolved {
                self.inventory.remove(&entry.fingerprint);
                deltas.push(IssueDelta {
                    fingerprint: entry.fingerprint,
                    node: entry.node,
                    kind: DeltaKind::Resolved,
                });
            }
        }

        self.has_baseline = true;
        deltas
    }

    /// Drop every tracked issue, e.g. after the mode is toggled off.
    pub fn reset(&mut self) {
        self.inventory.clear();
        self.has_baseline = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{Issue, ProblemTag};
    use crate::host::fixtures::dropdown_page;
    use crate::collect::{ScanOptions, TreeScanner};
    use crate::host::HostTree;

    fn issue_for(tag: ProblemTag, node_class: &str) -> Issue {
        let tree = dropdown_page();
        let out = TreeScanner::new().scan(&tree, tree.root(), ScanOptions::default());
        let snapshot = out
            .snapshots
            .into_iter()
            .find(|s| s.classes.contains(node_class) || node_class.is_empty())
            .unwrap();
        Issue::new(snapshot, [tag].into_iter().collect())
    }

    #[test]
    fn first_cycle_is_all_appeared() {
        let mut tracker = IssueTracker::new();
        let issues = vec![issue_for(ProblemTag::TransparentMenuBackground, "dropdown-menu")];
        let deltas = tracker.update(&issues, &ScanScope::Full);
        let summary = DeltaSummary::from_deltas(&deltas);
        assert_eq!(summary.appeared, 1);
        assert!(summary.changed());
    }

    #[test]
    fn identical_cycle_is_unchanged() {
        let mut tracker = IssueTracker::new();
        let issues = vec![issue_for(ProblemTag::TransparentMenuBackground, "dropdown-menu")];
        tracker.update(&issues, &ScanScope::Full);

        // Rebuilt issue: different timestamp, same fingerprint.
        let again = vec![issue_for(ProblemTag::TransparentMenuBackground, "dropdown-menu")];
        let summary = DeltaSummary::from_deltas(&tracker.update(&again, &ScanScope::Full));
        assert_eq!(summary.persisted, 1);
        assert!(!summary.changed());
    }

    #[test]
    fn resolution_is_scoped() {
        let mut tracker = IssueTracker::new();
        let issue = issue_for(ProblemTag::TransparentMenuBackground, "dropdown-menu");
        let node = issue.node;
        tracker.update(&[issue], &ScanScope::Full);

        let elsewhere = ScanScope::Nodes([NodeId(999)].into_iter().collect());
        let summary = DeltaSummary::from_deltas(&tracker.update(&[], &elsewhere));
        assert!(!summary.changed());
        assert_eq!(tracker.len(), 1);

        let here = ScanScope::Nodes([node].into_iter().collect());
        let summary = DeltaSummary::from_deltas(&tracker.update(&[], &here));
        assert_eq!(summary.resolved, 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn tag_change_on_same_node_is_a_new_issue() {
        let mut tracker = IssueTracker::new();
        tracker.update(
            &[issue_for(ProblemTag::TransparentMenuBackground, "dropdown-menu")],
            &ScanScope::Full,
        );
        let deltas = tracker.update(
            &[issue_for(ProblemTag::LowOpacity, "dropdown-menu")],
            &ScanScope::Full,
        );
        let summary = DeltaSummary::from_deltas(&deltas);
        assert_eq!(summary.appeared, 1);
        assert_eq!(summary.resolved, 1);
    }
}
