//! Pattern store: ledger, catalog, and derived records behind a key-value store.
//!
//! # Storage Structure
//!
//! ```text
//! <data dir>/<namespace>/
//! └── store.json     # StoreDocument: ledger + catalog + derived records
//! ```
//!
//! Only the ledger and the catalog are authoritative. Records are rebuilt
//! from the ledger on every load and import, so a document always reproduces
//! the same confidences and rule-text selections.
//!
//! # Degraded mode
//!
//! Any failed load or save flips the store into degraded mode. While
//! degraded, learned lookups return nothing and the synthesizer falls back
//! to low-confidence templates. The next successful load or save clears it.

use super::kv::{KeyValueStore, KvError};
use super::ledger::{CatalogEntry, FeedbackEntry, FeedbackLedger, PatchCatalog, Rating};
use super::pattern::{PatternLifecycle, PatternRecord};
use crate::inference::IssueSignature;
use crate::synth::Patch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};
use umbra_common::schema::{is_compatible, SCHEMA_VERSION};
use umbra_common::PatchId;
use umbra_config::{ConfigSnapshot, SynthesisPolicy};
use umbra_math::laplace;

/// Key of the store document inside the namespace.
pub const STORE_KEY: &str = "store";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("key-value store error: {0}")]
    Kv(#[from] KvError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("incompatible store schema version {found} (current {current})")]
    SchemaVersion { found: String, current: String },

    #[error("stored patterns were never read; refusing to overwrite them")]
    Unloaded,
}

impl From<PersistenceError> for umbra_common::Error {
    fn from(err: PersistenceError) -> Self {
        umbra_common::Error::Persistence(err.to_string())
    }
}

/// Portable serialized form of the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    pub schema_version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigSnapshot>,
    pub ledger: FeedbackLedger,
    #[serde(default)]
    pub catalog: PatchCatalog,
    /// Derived; informational only. Import rebuilds these from the ledger.
    #[serde(default)]
    pub records: Vec<PatternRecord>,
}

impl StoreDocument {
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if !is_compatible(&self.schema_version) {
            return Err(PersistenceError::SchemaVersion {
                found: self.schema_version.clone(),
                current: SCHEMA_VERSION.to_string(),
            });
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let doc: StoreDocument = serde_json::from_str(json)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Import conflict policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Discard local ledger and catalog.
    Replace,
    /// Append entries not already present (by patch id + timestamp).
    #[default]
    Merge,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub mode: Option<ImportMode>,
    pub entries_added: usize,
    pub entries_skipped: usize,
    pub catalog_added: usize,
    pub records: usize,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackOutcome {
    pub signature_key: String,
    /// Whether the rating could be tied to emitted rule text.
    pub attributed: bool,
    pub confidence: f64,
    pub observations: u32,
    pub lifecycle: PatternLifecycle,
    pub persisted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub ledger_entries: usize,
    pub catalog_entries: usize,
    pub global_records: usize,
    pub domain_records: usize,
    pub by_lifecycle: BTreeMap<PatternLifecycle, usize>,
    pub domains: Vec<String>,
    pub degraded: bool,
}

/// Confidence-scored map from issue signature to best-known rule text.
pub struct PatternStore {
    kv: Box<dyn KeyValueStore>,
    namespace: String,
    policy: SynthesisPolicy,
    ledger: FeedbackLedger,
    catalog: PatchCatalog,
    /// signature key → record.
    global: BTreeMap<String, PatternRecord>,
    /// domain → signature key → record.
    domains: BTreeMap<String, BTreeMap<String, PatternRecord>>,
    degraded: bool,
    dirty: bool,
    /// The last load failed; writing now would clobber unread data.
    load_failed: bool,
    /// Unrated catalog entries older than this are dropped on save.
    catalog_retention: Option<chrono::Duration>,
}

impl PatternStore {
    /// Empty store bound to `kv`. Nothing is read until [`PatternStore::load`].
    pub fn new(kv: Box<dyn KeyValueStore>, namespace: impl Into<String>, policy: SynthesisPolicy) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
            policy,
            ledger: FeedbackLedger::new(),
            catalog: PatchCatalog::default(),
            global: BTreeMap::new(),
            domains: BTreeMap::new(),
            degraded: false,
            dirty: false,
            load_failed: false,
            catalog_retention: None,
        }
    }

    pub fn with_catalog_retention(mut self, retention: Option<chrono::Duration>) -> Self {
        self.catalog_retention = retention;
        self
    }

    /// Create and load; a failed load leaves the store empty and degraded.
    pub fn open(kv: Box<dyn KeyValueStore>, namespace: impl Into<String>, policy: SynthesisPolicy) -> Self {
        let mut store = Self::new(kv, namespace, policy);
        if let Err(err) = store.load() {
            warn!(error = %err, "pattern store load failed; continuing in degraded mode");
        }
        store
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn policy(&self) -> &SynthesisPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &FeedbackLedger {
        &self.ledger
    }

    pub fn catalog(&self) -> &PatchCatalog {
        &self.catalog
    }

    pub fn record(&self, signature: &IssueSignature) -> Option<&PatternRecord> {
        self.global.get(&signature.key())
    }

    pub fn domain_record(&self, domain: &str, signature: &IssueSignature) -> Option<&PatternRecord> {
        self.domains.get(domain).and_then(|m| m.get(&signature.key()))
    }

    pub fn records(&self) -> impl Iterator<Item = &PatternRecord> {
        self.global
            .values()
            .chain(self.domains.values().flat_map(|m| m.values()))
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Reload ledger and catalog from the key-value store.
    pub fn load(&mut self) -> Result<(), PersistenceError> {
        let result = self
            .kv
            .get(&self.namespace, STORE_KEY)
            .map_err(PersistenceError::from)
            .and_then(|raw| raw.map(|json| StoreDocument::from_json(&json)).transpose());

        match result {
            Ok(Some(doc)) => {
                self.ledger = doc.ledger;
                self.catalog = doc.catalog;
                self.rebuild_all();
                self.degraded = false;
                self.dirty = false;
                self.load_failed = false;
                info!(
                    entries = self.ledger.len(),
                    records = self.global.len(),
                    "pattern store loaded"
                );
                Ok(())
            }
            Ok(None) => {
                self.degraded = false;
                self.load_failed = false;
                debug!(namespace = %self.namespace, "no stored patterns; starting empty");
                Ok(())
            }
            Err(err) => {
                self.degraded = true;
                self.load_failed = true;
                Err(err)
            }
        }
    }

    /// Write the store document back. Last writer wins.
    pub fn save(&mut self) -> Result<(), PersistenceError> {
        if self.load_failed {
            self.degraded = true;
            return Err(PersistenceError::Unloaded);
        }
        if let Some(retention) = self.catalog_retention {
            self.prune_catalog(Utc::now() - retention);
        }
        let result = self
            .export(None)
            .to_json()
            .and_then(|json| Ok(self.kv.set(&self.namespace, STORE_KEY, &json)?));
        match result {
            Ok(()) => {
                self.degraded = false;
                self.dirty = false;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "pattern store save failed; entering degraded mode");
                self.degraded = true;
                Err(err)
            }
        }
    }

    /// Save only if something changed since the last load/save.
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        if self.dirty {
            self.save()
        } else {
            Ok(())
        }
    }

    // ── Catalog & feedback ──────────────────────────────────────────────

    /// Forget emitted patches created before `cutoff` that were never rated.
    pub fn prune_catalog(&mut self, cutoff: DateTime<Utc>) -> usize {
        let rated = self.ledger.rated_patches();
        let pruned = self.catalog.prune(cutoff, &rated);
        if pruned > 0 {
            debug!(pruned, remaining = self.catalog.len(), "catalog pruned");
        }
        pruned
    }

    /// Remember what was emitted for `patch`, so a later rating is attributable.
    pub fn register_patch(&mut self, patch: &Patch, domain: Option<&str>) {
        self.catalog.insert(
            patch.id.clone(),
            CatalogEntry {
                rule_text: patch.rule_text.clone(),
                source_kind: patch.source_kind,
                domain: domain.map(str::to_string),
                signature: patch.signature.clone(),
                created_at: patch.created_at,
            },
        );
        self.dirty = true;
    }

    /// Append a rating and recompute the signature's records.
    ///
    /// A failed write-back degrades the store but keeps the in-memory entry.
    pub fn record_feedback(
        &mut self,
        signature: &IssueSignature,
        patch_id: &PatchId,
        rating: Rating,
    ) -> FeedbackOutcome {
        let cataloged = self.catalog.get(patch_id).cloned();
        if cataloged.is_none() {
            warn!(patch = %patch_id, "rating for unknown patch; recording without rule text");
        }

        let entry = FeedbackEntry {
            signature: signature.clone(),
            patch_id: patch_id.clone(),
            rating,
            timestamp: Utc::now(),
            rule_text: cataloged.as_ref().map(|c| c.rule_text.clone()),
            domain: cataloged.as_ref().and_then(|c| c.domain.clone()),
            element_type: signature.element_type.clone(),
            source_kind: cataloged.as_ref().map(|c| c.source_kind),
        };
        self.ledger.append(entry);
        self.rebuild_signature(signature);
        self.dirty = true;

        let persisted = self.save().is_ok();
        let record = self.global.get(&signature.key());
        let outcome = FeedbackOutcome {
            signature_key: signature.key(),
            attributed: cataloged.is_some(),
            confidence: record.map(|r| r.confidence).unwrap_or(0.0),
            observations: record.map(|r| r.observations()).unwrap_or(0),
            lifecycle: record.map(|r| r.lifecycle).unwrap_or_default(),
            persisted,
        };
        debug!(
            target: "umbra::feedback",
            signature = %outcome.signature_key,
            rating = %rating,
            confidence = outcome.confidence,
            observations = outcome.observations,
            lifecycle = outcome.lifecycle.as_str(),
            "feedback recorded"
        );
        outcome
    }

    /// Rate a cataloged patch without restating its signature.
    pub fn record_feedback_for_patch(
        &mut self,
        patch_id: &PatchId,
        rating: Rating,
    ) -> Option<FeedbackOutcome> {
        let signature = self.catalog.get(patch_id)?.signature.clone();
        Some(self.record_feedback(&signature, patch_id, rating))
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// A servable learned record for `signature`, domain bucket first.
    ///
    /// The domain bucket is only consulted once it holds enough same-domain
    /// observations. Candidates must pass the confidence and observation
    /// gates and carry rule text. Degraded stores serve nothing.
    pub fn lookup(&self, signature: &IssueSignature, domain: Option<&str>) -> Option<&PatternRecord> {
        if self.degraded {
            return None;
        }
        let key = signature.key();
        let domain_candidate = domain
            .and_then(|d| self.domains.get(d))
            .and_then(|m| m.get(&key))
            .filter(|r| r.observations() >= self.policy.domain_min_samples);

        domain_candidate
            .into_iter()
            .chain(self.global.get(&key))
            .find(|r| self.passes_learned_gate(r))
    }

    fn passes_learned_gate(&self, record: &PatternRecord) -> bool {
        record.lifecycle.is_servable()
            && record.rule_text.is_some()
            && record.confidence >= self.policy.learned_min_confidence
            && record.observations() >= self.policy.learned_min_observations
    }

    /// Laplace-smoothed success rate for an element type, domain first.
    ///
    /// 0.5 without any evidence.
    pub fn element_confidence(&self, element_type: &str, domain: Option<&str>) -> f64 {
        let tally = |domain_filter: Option<&str>| {
            self.ledger
                .entries()
                .iter()
                .filter(|e| e.element_type == element_type)
                .filter(|e| domain_filter.is_none() || e.domain.as_deref() == domain_filter)
                .fold((0u32, 0u32), |(s, f), e| {
                    if e.rating.is_success() {
                        (s + 1, f)
                    } else {
                        (s, f + 1)
                    }
                })
        };

        if let Some(d) = domain {
            let (s, f) = tally(Some(d));
            if s + f >= self.policy.domain_min_samples {
                return laplace(s, f);
            }
        }
        let (s, f) = tally(None);
        laplace(s, f)
    }

    // ── Export / import ─────────────────────────────────────────────────

    pub fn export(&self, config: Option<ConfigSnapshot>) -> StoreDocument {
        StoreDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            exported_at: Utc::now(),
            config,
            ledger: self.ledger.clone(),
            catalog: self.catalog.clone(),
            records: self.records().cloned().collect(),
        }
    }

    /// Import a document and replay its ledger.
    pub fn import(&mut self, doc: StoreDocument, mode: ImportMode) -> Result<ImportReport, PersistenceError> {
        doc.validate()?;
        let mut report = ImportReport {
            mode: Some(mode),
            ..Default::default()
        };

        match mode {
            ImportMode::Replace => {
                self.load_failed = false;
                report.entries_added = doc.ledger.len();
                report.catalog_added = doc.catalog.len();
                self.ledger = doc.ledger;
                self.catalog = doc.catalog;
            }
            ImportMode::Merge => {
                for entry in doc.ledger.entries() {
                    if self.ledger.contains(entry) {
                        report.entries_skipped += 1;
                    } else {
                        self.ledger.append(entry.clone());
                        report.entries_added += 1;
                    }
                }
                for (id, entry) in doc.catalog.iter() {
                    if !self.catalog.contains(id) {
                        self.catalog.insert(id.clone(), entry.clone());
                        report.catalog_added += 1;
                    }
                }
            }
        }

        self.rebuild_all();
        self.dirty = true;
        report.records = self.global.len();
        report.persisted = self.save().is_ok();
        info!(
            mode = ?mode,
            added = report.entries_added,
            skipped = report.entries_skipped,
            records = report.records,
            "store imported"
        );
        Ok(report)
    }

    pub fn stats(&self) -> StoreStats {
        let mut by_lifecycle = BTreeMap::new();
        for record in self.global.values() {
            *by_lifecycle.entry(record.lifecycle).or_insert(0) += 1;
        }
        StoreStats {
            ledger_entries: self.ledger.len(),
            catalog_entries: self.catalog.len(),
            global_records: self.global.len(),
            domain_records: self.domains.values().map(|m| m.len()).sum(),
            by_lifecycle,
            domains: self.domains.keys().cloned().collect(),
            degraded: self.degraded,
        }
    }

    // ── Derivation ──────────────────────────────────────────────────────

    fn rebuild_signature(&mut self, signature: &IssueSignature) {
        let entries: Vec<&FeedbackEntry> = self.ledger.for_signature(signature).collect();
        derive_into(
            &mut self.global,
            &mut self.domains,
            &self.policy,
            signature,
            &entries,
        );
    }

    fn rebuild_all(&mut self) {
        self.global.clear();
        self.domains.clear();
        for (signature, entries) in self.ledger.grouped() {
            derive_into(
                &mut self.global,
                &mut self.domains,
                &self.policy,
                signature,
                &entries,
            );
        }
    }
}

/// Recompute the global and per-domain records of one signature.
fn derive_into(
    global: &mut BTreeMap<String, PatternRecord>,
    domains: &mut BTreeMap<String, BTreeMap<String, PatternRecord>>,
    policy: &SynthesisPolicy,
    signature: &IssueSignature,
    entries: &[&FeedbackEntry],
) {
    let key = signature.key();
    match PatternRecord::derive(signature, None, entries.iter().copied(), policy) {
        Some(record) => {
            global.insert(key.clone(), record);
        }
        None => {
            global.remove(&key);
        }
    }

    let scoped: BTreeSet<&str> = entries.iter().filter_map(|e| e.domain.as_deref()).collect();
    for domain in scoped {
        if let Some(record) = PatternRecord::derive(signature, Some(domain), entries.iter().copied(), policy) {
            domains
                .entry(domain.to_string())
                .or_default()
                .insert(key.clone(), record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ProblemTag;
    use crate::store::kv::MemoryKvStore;
    use crate::synth::SourceKind;
    use umbra_common::NodeId;

    fn sig() -> IssueSignature {
        IssueSignature::new([ProblemTag::TransparentMenuBackground], "div", ["dropdown-menu".to_string()])
    }

    fn patch(rule: &str) -> Patch {
        Patch {
            id: PatchId::new(),
            node: NodeId(2),
            selector: "div.dropdown-menu".to_string(),
            rule_text: rule.to_string(),
            source_kind: SourceKind::Generated,
            confidence: 0.5,
            created_at: Utc::now(),
            signature: sig(),
        }
    }

    fn store(kv: &MemoryKvStore) -> PatternStore {
        PatternStore::open(Box::new(kv.clone()), "umbra", SynthesisPolicy::default())
    }

    fn rate(store: &mut PatternStore, rule: &str, rating: Rating, domain: Option<&str>) -> FeedbackOutcome {
        let p = patch(rule);
        store.register_patch(&p, domain);
        store.record_feedback(&p.signature, &p.id, rating)
    }

    const RULE: &str = "background-color: rgb(32, 32, 32) !important;";

    #[test]
    fn positives_raise_confidence_and_one_negative_gives_n_over_n_plus_one() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        let mut last = 0.0;
        for _ in 0..4 {
            let out = rate(&mut s, RULE, Rating::Good, None);
            assert!(out.confidence >= last);
            assert!(out.confidence <= 1.0);
            last = out.confidence;
        }
        assert_eq!(last, 1.0);
        let out = rate(&mut s, RULE, Rating::Bad, None);
        assert!((out.confidence - 4.0 / 5.0).abs() < 1e-12);
        assert!(out.persisted);
    }

    #[test]
    fn lookup_requires_confidence_and_observations() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        rate(&mut s, RULE, Rating::Good, None);
        rate(&mut s, RULE, Rating::Good, None);
        assert!(s.lookup(&sig(), None).is_none(), "two observations are not enough");
        rate(&mut s, RULE, Rating::Good, None);
        let rec = s.lookup(&sig(), None).expect("learned record");
        assert_eq!(rec.rule_text.as_deref(), Some(RULE));

        rate(&mut s, RULE, Rating::Bad, None);
        rate(&mut s, RULE, Rating::Bad, None);
        // 3/5 = 0.6 still passes; one more failure drops it below.
        assert!(s.lookup(&sig(), None).is_some());
        rate(&mut s, RULE, Rating::Bad, None);
        assert!(s.lookup(&sig(), None).is_none());
    }

    #[test]
    fn domain_bucket_wins_once_it_has_enough_samples() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        for _ in 0..3 {
            rate(&mut s, "color: white !important;", Rating::Good, None);
        }
        let domain_rule = "background-color: black !important;";
        rate(&mut s, domain_rule, Rating::Good, Some("example.com"));
        // One same-domain sample: global still serves.
        let rec = s.lookup(&sig(), Some("example.com")).unwrap();
        assert_eq!(rec.domain_scope, None);

        rate(&mut s, domain_rule, Rating::Good, Some("example.com"));
        rate(&mut s, domain_rule, Rating::Good, Some("example.com"));
        let rec = s.lookup(&sig(), Some("example.com")).unwrap();
        assert_eq!(rec.domain_scope.as_deref(), Some("example.com"));
        assert_eq!(rec.rule_text.as_deref(), Some(domain_rule));
    }

    #[test]
    fn store_survives_restart() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        for _ in 0..3 {
            rate(&mut s, RULE, Rating::Good, None);
        }
        let reopened = store(&kv);
        assert_eq!(reopened.ledger().len(), 3);
        assert_eq!(reopened.record(&sig()), s.record(&sig()));
    }

    #[test]
    fn export_import_reproduces_records() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        rate(&mut s, RULE, Rating::Good, Some("a.test"));
        rate(&mut s, "color: red !important;", Rating::Good, None);
        rate(&mut s, RULE, Rating::Good, None);
        rate(&mut s, RULE, Rating::Bad, Some("a.test"));

        let json = s.export(None).to_json().unwrap();
        let doc = StoreDocument::from_json(&json).unwrap();

        let mut fresh = store(&MemoryKvStore::new());
        let report = fresh.import(doc, ImportMode::Replace).unwrap();
        assert_eq!(report.entries_added, 4);

        let original: Vec<&PatternRecord> = s.records().collect();
        let imported: Vec<&PatternRecord> = fresh.records().collect();
        assert_eq!(original, imported);
    }

    #[test]
    fn merge_skips_known_entries() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        rate(&mut s, RULE, Rating::Good, None);
        let doc = s.export(None);
        let report = s.import(doc, ImportMode::Merge).unwrap();
        assert_eq!(report.entries_added, 0);
        assert_eq!(report.entries_skipped, 1);
        assert_eq!(s.ledger().len(), 1);
    }

    #[test]
    fn failed_save_degrades_until_next_success() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        for _ in 0..3 {
            rate(&mut s, RULE, Rating::Good, None);
        }
        kv.set_fail_writes(true);
        let out = rate(&mut s, RULE, Rating::Good, None);
        assert!(!out.persisted);
        assert!(s.is_degraded());
        assert!(s.lookup(&sig(), None).is_none());

        kv.set_fail_writes(false);
        s.save().unwrap();
        assert!(!s.is_degraded());
        assert!(s.lookup(&sig(), None).is_some());
    }

    #[test]
    fn unreadable_store_opens_degraded() {
        let kv = MemoryKvStore::new();
        kv.set_fail_reads(true);
        let s = store(&kv);
        assert!(s.is_degraded());
        assert!(s.stats().degraded);
    }

    #[test]
    fn failed_load_never_overwrites_stored_patterns() {
        let kv = MemoryKvStore::new();
        {
            let mut s = store(&kv);
            rate(&mut s, RULE, Rating::Good, None);
        }
        kv.set_fail_reads(true);
        let mut blind = store(&kv);
        let out = blind.record_feedback(&sig(), &PatchId("patch-x".into()), Rating::Bad);
        assert!(!out.persisted);
        assert!(matches!(blind.save(), Err(PersistenceError::Unloaded)));

        kv.set_fail_reads(false);
        let reopened = store(&kv);
        assert_eq!(reopened.ledger().len(), 1);
    }

    #[test]
    fn unknown_patch_is_recorded_unattributed() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        let out = s.record_feedback(&sig(), &PatchId("patch-missing".into()), Rating::Good);
        assert!(!out.attributed);
        assert_eq!(out.observations, 1);
        assert_eq!(s.record(&sig()).unwrap().rule_text, None);
    }

    #[test]
    fn element_confidence_is_laplace_with_domain_preference() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        assert_eq!(s.element_confidence("div", None), 0.5);
        rate(&mut s, RULE, Rating::Bad, None);
        rate(&mut s, RULE, Rating::Bad, None);
        // (0+1)/(2+2)
        assert!((s.element_confidence("div", None) - 0.25).abs() < 1e-12);
        rate(&mut s, RULE, Rating::Good, Some("ok.test"));
        rate(&mut s, RULE, Rating::Good, Some("ok.test"));
        // Domain bucket: (2+1)/(2+2)
        assert!((s.element_confidence("div", Some("ok.test")) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn stats_group_by_lifecycle() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        rate(&mut s, RULE, Rating::Good, Some("x.test"));
        let stats = s.stats();
        assert_eq!(stats.ledger_entries, 1);
        assert_eq!(stats.global_records, 1);
        assert_eq!(stats.domain_records, 1);
        assert_eq!(stats.by_lifecycle.get(&PatternLifecycle::Learning), Some(&1));
        assert_eq!(stats.domains, vec!["x.test".to_string()]);
    }

    #[test]
    fn save_prunes_stale_unrated_patches() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv).with_catalog_retention(Some(chrono::Duration::days(30)));

        let mut stale = patch(RULE);
        stale.created_at = Utc::now() - chrono::Duration::days(45);
        s.register_patch(&stale, None);

        let mut rated = patch(RULE);
        rated.created_at = Utc::now() - chrono::Duration::days(45);
        s.register_patch(&rated, None);
        s.record_feedback(&rated.signature, &rated.id, Rating::Good);

        let fresh = patch(RULE);
        s.register_patch(&fresh, None);

        s.save().unwrap();
        assert!(s.catalog().get(&stale.id).is_none());
        assert!(s.catalog().get(&rated.id).is_some());
        assert!(s.catalog().get(&fresh.id).is_some());

        let reopened = store(&kv);
        assert_eq!(reopened.catalog().len(), 2);
    }

    #[test]
    fn without_retention_the_catalog_is_kept() {
        let kv = MemoryKvStore::new();
        let mut s = store(&kv);
        let mut old = patch(RULE);
        old.created_at = Utc::now() - chrono::Duration::days(400);
        s.register_patch(&old, None);
        s.save().unwrap();
        assert!(s.catalog().get(&old.id).is_some());
    }
}
