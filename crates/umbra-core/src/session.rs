//! Process-scoped session state.
//!
//! A [`Session`] owns everything one page instance needs: the enabled flag,
//! the loaded pattern store, the applied-patch registry and the previous
//! cycle's issue set. Components never reach for globals; they receive the
//! session (or the part of it they need).
//!
//! # Cycle
//!
//! ```text
//! scan(scope) ─► classify ─► IssueTracker::update
//!                                  │ unchanged fingerprint set → stop
//!                                  ▼
//!                appeared + still-unpatched issues
//!                                  │
//!                    synthesize (sequential) ─► register ─► apply
//! ```

use crate::action::{ApplyOutcome, DisableReport, PatchApplier};
use crate::collect::{DeltaKind, DeltaSummary, IssueTracker, ScanOptions, ScanReport, ScanScope, TreeScanner};
use crate::host::HostTree;
use crate::inference::{
    build_classifier, detect_issues, ClassifierStrategy, DefectClassifier, Issue, IssueSignature,
};
use crate::monitor::{ScanRequest, ScanSink, Trigger};
use crate::store::{FeedbackOutcome, KeyValueStore, PatternStore, Rating};
use crate::synth::{PatchGenerator, PatchSynthesizer, SourceKind, Synthesis};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use umbra_common::{IssueFingerprint, NodeId, PatchId, SessionId};
use umbra_config::Policy;

/// One patch emitted during a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct PatchRecord {
    pub node: NodeId,
    pub patch_id: PatchId,
    pub selector: String,
    pub css: String,
    pub source_kind: SourceKind,
    pub confidence: f64,
    pub outcome: ApplyOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeFailure {
    pub node: NodeId,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Completed,
    /// Fingerprint set unchanged; synthesis and apply skipped.
    Unchanged,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub session_id: SessionId,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub scan: ScanReport,
    pub issues: Vec<String>,
    pub delta: DeltaSummary,
    pub patches: Vec<PatchRecord>,
    pub no_patch: Vec<NodeFailure>,
    pub apply_errors: Vec<NodeFailure>,
    /// Patches dropped because their node left the tree.
    pub released: usize,
}

impl CycleReport {
    fn empty(session_id: SessionId, status: CycleStatus) -> Self {
        Self {
            session_id,
            status,
            started_at: Utc::now(),
            scan: ScanReport::default(),
            issues: Vec::new(),
            delta: DeltaSummary::default(),
            patches: Vec::new(),
            no_patch: Vec::new(),
            apply_errors: Vec::new(),
            released: 0,
        }
    }
}

pub struct Session {
    id: SessionId,
    policy: Policy,
    domain: Option<String>,
    enabled: bool,
    scanner: TreeScanner,
    classifier: Box<dyn DefectClassifier>,
    synthesizer: PatchSynthesizer,
    store: PatternStore,
    applier: PatchApplier,
    tracker: IssueTracker,
    /// Issues seen but not yet patched; retried whenever downstream runs.
    unpatched: HashSet<IssueFingerprint>,
}

impl Session {
    /// Build a session with the heuristic classifier and no generator.
    pub fn new(policy: Policy, kv: Box<dyn KeyValueStore>) -> Self {
        let store = PatternStore::open(kv, policy.store.namespace.clone(), policy.synthesis.clone())
            .with_catalog_retention(policy.store.catalog_retention());
        Self {
            id: SessionId::new(),
            classifier: build_classifier(ClassifierStrategy::Heuristic, policy.classifier.clone()),
            synthesizer: PatchSynthesizer::new(policy.synthesis.clone()),
            policy,
            domain: None,
            enabled: false,
            scanner: TreeScanner::new(),
            store,
            applier: PatchApplier::new(),
            tracker: IssueTracker::new(),
            unpatched: HashSet::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_classifier(mut self, strategy: ClassifierStrategy) -> Self {
        self.classifier = build_classifier(strategy, self.policy.classifier.clone());
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn PatchGenerator>) -> Self {
        self.synthesizer = PatchSynthesizer::new(self.policy.synthesis.clone()).with_generator(generator);
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PatternStore {
        &mut self.store
    }

    pub fn applier(&self) -> &PatchApplier {
        &self.applier
    }

    pub fn tracker(&self) -> &IssueTracker {
        &self.tracker
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Turn the mode on: set the top-level marker and start tracking.
    pub fn init(&mut self, host: &mut dyn HostTree) -> Result<(), umbra_common::Error> {
        self.applier.enable_mode(host)?;
        self.enabled = true;
        info!(session = %self.id, classifier = self.classifier.name(), "session started");
        Ok(())
    }

    /// Turn the mode off and forget per-cycle state. The store is kept.
    pub fn reset(&mut self, host: &mut dyn HostTree) -> DisableReport {
        let report = self.applier.disable_all(host);
        self.enabled = false;
        self.tracker.reset();
        self.unpatched.clear();
        info!(session = %self.id, removed = report.removed, "session reset");
        report
    }

    /// Global disable: every block and the mode marker in one call.
    pub fn disable(&mut self, host: &mut dyn HostTree) -> DisableReport {
        self.reset(host)
    }

    /// Scan `scope`, classify, and patch whatever changed.
    ///
    /// Cycles never overlap: each holds the session exclusively, and the
    /// change monitor issues no request while one is in flight.
    pub async fn run_cycle(&mut self, host: &mut dyn HostTree, scope: &ScanScope) -> CycleReport {
        if !self.enabled {
            return CycleReport::empty(self.id.clone(), CycleStatus::Disabled);
        }
        self.cycle(host, scope).await
    }

    async fn cycle(&mut self, host: &mut dyn HostTree, scope: &ScanScope) -> CycleReport {
        let mut report = CycleReport::empty(self.id.clone(), CycleStatus::Completed);
        let (snapshots, scan, covered) = self.scan(&*host, scope);
        report.scan = scan;
        if covered == ScanScope::Full {
            report.released = self.applier.release_detached(host);
        }

        let issues = detect_issues(self.classifier.as_ref(), snapshots);
        report.issues = issues.iter().map(Issue::describe).collect();

        let deltas = self.tracker.update(&issues, &covered);
        report.delta = DeltaSummary::from_deltas(&deltas);
        for delta in deltas.iter().filter(|d| d.kind == DeltaKind::Resolved) {
            self.unpatched.remove(&delta.fingerprint);
        }
        if !report.delta.changed() && self.unpatched.is_empty() {
            report.status = CycleStatus::Unchanged;
            debug!(issues = issues.len(), "issue set unchanged; skipping synthesis");
            return report;
        }

        let appeared: HashSet<IssueFingerprint> = deltas
            .iter()
            .filter(|d| d.kind == DeltaKind::Appeared)
            .map(|d| d.fingerprint.clone())
            .collect();
        let mut work: Vec<(IssueFingerprint, &Issue)> = Vec::new();
        for issue in &issues {
            let fp = issue.fingerprint();
            if appeared.contains(&fp) || self.unpatched.contains(&fp) {
                work.push((fp, issue));
            }
        }
        if work.is_empty() {
            return report;
        }

        let targets: Vec<&Issue> = work.iter().map(|(_, issue)| *issue).collect();
        let results = self
            .synthesizer
            .synthesize_batch(&targets, &self.store, self.domain.as_deref())
            .await;

        for ((fingerprint, issue), synthesis) in work.into_iter().zip(results) {
            let patch = match synthesis {
                Synthesis::Patch(patch) => patch,
                Synthesis::NoPatch(reason) => {
                    debug!(node = %issue.node, reason = %reason, "no patch");
                    self.unpatched.insert(fingerprint);
                    report.no_patch.push(NodeFailure {
                        node: issue.node,
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            self.store.register_patch(&patch, self.domain.as_deref());
            match self.applier.apply(host, &patch, issue.node) {
                Ok(outcome) => {
                    self.unpatched.remove(&fingerprint);
                    report.patches.push(PatchRecord {
                        node: issue.node,
                        patch_id: patch.id.clone(),
                        selector: patch.selector.clone(),
                        css: patch.css(),
                        source_kind: patch.source_kind,
                        confidence: patch.confidence,
                        outcome,
                    });
                }
                Err(err) => {
                    warn!(node = %issue.node, error = %err, "patch not applied");
                    self.unpatched.insert(fingerprint);
                    report.apply_errors.push(NodeFailure {
                        node: issue.node,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if let Err(err) = self.store.flush() {
            warn!(error = %err, "catalog not persisted");
        }
        info!(
            session = %self.id,
            issues = issues.len(),
            appeared = report.delta.appeared,
            resolved = report.delta.resolved,
            patched = report.patches.len(),
            unpatched = report.no_patch.len() + report.apply_errors.len(),
            "cycle complete"
        );
        report
    }

    /// Scan the requested region. Returns snapshots, accounting, and the
    /// scope actually covered (for resolution inference).
    fn scan(
        &self,
        host: &dyn HostTree,
        scope: &ScanScope,
    ) -> (Vec<crate::collect::StyleSnapshot>, ScanReport, ScanScope) {
        let options = ScanOptions {
            force_revalidate: false,
            max_nodes: self.policy.monitor.max_nodes_per_scan,
        };
        match scope {
            ScanScope::Full => {
                let out = self.scanner.scan(host, host.root(), options);
                (out.snapshots, out.report, ScanScope::Full)
            }
            ScanScope::Nodes(roots) => {
                let mut seen: HashSet<NodeId> = HashSet::new();
                let mut snapshotted: HashSet<NodeId> = HashSet::new();
                let mut snapshots = Vec::new();
                let mut report = ScanReport::default();
                let mut ordered: Vec<NodeId> = roots.iter().copied().collect();
                ordered.sort();
                for root in ordered {
                    if seen.contains(&root) {
                        continue;
                    }
                    let out = self.scanner.scan(host, root, options);
                    report.visited += out.report.visited;
                    report.skipped_zero_box += out.report.skipped_zero_box;
                    report.skipped_marked += out.report.skipped_marked;
                    report.skipped_unreadable += out.report.skipped_unreadable;
                    report.truncated |= out.report.truncated;
                    seen.extend(out.visited_nodes.iter().copied());
                    for snap in out.snapshots {
                        if snapshotted.insert(snap.node) {
                            snapshots.push(snap);
                        }
                    }
                }
                report.snapshotted = snapshots.len();
                (snapshots, report, ScanScope::Nodes(seen))
            }
        }
    }

    /// Rate a patch this session (or an earlier one) emitted.
    ///
    /// Patches missing from the catalog need `signature` to be recorded.
    pub fn record_feedback(
        &mut self,
        patch_id: &PatchId,
        rating: Rating,
        signature: Option<&IssueSignature>,
    ) -> Result<FeedbackOutcome, umbra_common::Error> {
        if let Some(outcome) = self.store.record_feedback_for_patch(patch_id, rating) {
            return Ok(outcome);
        }
        match signature {
            Some(sig) => Ok(self.store.record_feedback(sig, patch_id, rating)),
            None => Err(umbra_common::Error::UnknownPatch(patch_id.to_string())),
        }
    }

    /// Conversational fix for one node, applied on success.
    pub async fn ask(
        &mut self,
        host: &mut dyn HostTree,
        node: NodeId,
        message: &str,
    ) -> Result<PatchRecord, umbra_common::Error> {
        let options = ScanOptions {
            force_revalidate: true,
            max_nodes: 1,
        };
        let snapshot = self
            .scanner
            .scan(&*host, node, options)
            .snapshots
            .into_iter()
            .next()
            .ok_or_else(|| umbra_common::Error::Classification {
                node: node.to_string(),
                reason: "node has no readable style".to_string(),
            })?;
        let tags = self.classifier.classify(&snapshot);
        let issue = Issue::new(snapshot, tags);

        let patch = self.synthesizer.ask(&issue, message).await?;
        self.store.register_patch(&patch, self.domain.as_deref());
        let outcome = self.applier.apply(host, &patch, node)?;
        if let Err(err) = self.store.flush() {
            warn!(error = %err, "catalog not persisted");
        }
        Ok(PatchRecord {
            node,
            patch_id: patch.id.clone(),
            selector: patch.selector.clone(),
            css: patch.css(),
            source_kind: patch.source_kind,
            confidence: patch.confidence,
            outcome,
        })
    }
}

/// Adapter that runs session cycles for the change monitor.
pub struct SessionRunner<'a> {
    pub session: &'a mut Session,
    pub host: &'a mut dyn HostTree,
    pub reports: Vec<CycleReport>,
    pub triggers: HashMap<Trigger, usize>,
}

impl<'a> SessionRunner<'a> {
    pub fn new(session: &'a mut Session, host: &'a mut dyn HostTree) -> Self {
        Self {
            session,
            host,
            reports: Vec::new(),
            triggers: HashMap::new(),
        }
    }
}

#[async_trait(?Send)]
impl ScanSink for SessionRunner<'_> {
    async fn scan(&mut self, request: ScanRequest) {
        *self.triggers.entry(request.trigger).or_insert(0) += 1;
        let report = self.session.run_cycle(&mut *self.host, &request.scope).await;
        self.reports.push(report);
    }
}
