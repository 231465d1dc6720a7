//! Append-only feedback ledger and the patch catalog.

use crate::inference::IssueSignature;
use crate::synth::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use umbra_common::PatchId;

/// User verdict on an applied patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Good,
    Bad,
}

impl Rating {
    pub fn is_success(&self) -> bool {
        matches!(self, Rating::Good)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rating::Good => "good",
            Rating::Bad => "bad",
        })
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good" | "up" | "positive" | "+" => Ok(Rating::Good),
            "bad" | "down" | "negative" | "-" => Ok(Rating::Bad),
            other => Err(format!("unknown rating '{}' (expected good or bad)", other)),
        }
    }
}

/// One recorded rating. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub signature: IssueSignature,
    pub patch_id: PatchId,
    pub rating: Rating,
    pub timestamp: DateTime<Utc>,
    /// Rule text of the rated patch, when the catalog knew it.
    #[serde(default)]
    pub rule_text: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    pub element_type: String,
    #[serde(default)]
    pub source_kind: Option<SourceKind>,
}

impl FeedbackEntry {
    /// Identity used to deduplicate entries on merge.
    pub fn identity(&self) -> (PatchId, DateTime<Utc>) {
        (self.patch_id.clone(), self.timestamp)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackLedger {
    entries: Vec<FeedbackEntry>,
}

impl FeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<FeedbackEntry>) -> Self {
        Self { entries }
    }

    pub fn append(&mut self, entry: FeedbackEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[FeedbackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &FeedbackEntry) -> bool {
        let id = entry.identity();
        self.entries.iter().any(|e| e.identity() == id)
    }

    /// Entries for one signature, in append order.
    pub fn for_signature<'a>(
        &'a self,
        signature: &'a IssueSignature,
    ) -> impl Iterator<Item = &'a FeedbackEntry> + 'a {
        self.entries.iter().filter(move |e| e.signature == *signature)
    }

    /// Every entry grouped by signature, append order kept within a group.
    pub fn grouped(&self) -> BTreeMap<&IssueSignature, Vec<&FeedbackEntry>> {
        let mut groups: BTreeMap<&IssueSignature, Vec<&FeedbackEntry>> = BTreeMap::new();
        for entry in &self.entries {
            groups.entry(&entry.signature).or_default().push(entry);
        }
        groups
    }

    pub fn rated_patches(&self) -> HashSet<&PatchId> {
        self.entries.iter().map(|e| &e.patch_id).collect()
    }
}

/// What the synthesizer emitted for a patch id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub rule_text: String,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub domain: Option<String>,
    pub signature: IssueSignature,
    pub created_at: DateTime<Utc>,
}

/// patchId → emitted rule text, so later ratings are attributable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchCatalog {
    entries: BTreeMap<PatchId, CatalogEntry>,
}

impl PatchCatalog {
    pub fn insert(&mut self, id: PatchId, entry: CatalogEntry) {
        self.entries.insert(id, entry);
    }

    pub fn get(&self, id: &PatchId) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &PatchId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PatchId, &CatalogEntry)> {
        self.entries.iter()
    }

    /// Drop entries created before `cutoff` unless they appear in `rated`.
    pub fn prune(&mut self, cutoff: DateTime<Utc>, rated: &HashSet<&PatchId>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|id, entry| entry.created_at >= cutoff || rated.contains(id));
        before - self.entries.len()
    }
}
