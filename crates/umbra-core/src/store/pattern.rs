//! Pattern records derived from the feedback ledger.
//!
//! # Pattern Lifecycle
//!
//! ```text
//! [New] → [Learning] → [Stable]
//!    └────────┴───────────┴──→ [Deprecated]
//!
//! New: confidence < 0.5
//! Learning: 0.5 ≤ confidence < stable cutoff
//! Stable: confidence ≥ stable cutoff, observations ≥ stable minimum
//! Deprecated: confidence < demotion cutoff after ≥ 3 observations
//! ```
//!
//! Records are never edited in place; every feedback entry recomputes the
//! affected records from the ledger.

use super::ledger::FeedbackEntry;
use crate::inference::IssueSignature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use umbra_config::SynthesisPolicy;
use umbra_math::frequency;

/// Observations required before a record can be deprecated.
const DEMOTION_MIN_OBSERVATIONS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternLifecycle {
    #[default]
    New,
    Learning,
    Stable,
    Deprecated,
}

impl PatternLifecycle {
    /// Whether the learned path may serve this record.
    pub fn is_servable(&self) -> bool {
        !matches!(self, Self::Deprecated)
    }

    pub fn from_stats(confidence: f64, observations: u32, policy: &SynthesisPolicy) -> Self {
        if observations >= DEMOTION_MIN_OBSERVATIONS && confidence < policy.demotion_confidence {
            Self::Deprecated
        } else if confidence >= policy.stable_confidence
            && observations >= policy.stable_min_observations
        {
            Self::Stable
        } else if confidence >= 0.5 {
            Self::Learning
        } else {
            Self::New
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Stable => "stable",
            Self::Deprecated => "deprecated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub signature: IssueSignature,
    /// Majority-vote rule text across successful entries.
    pub rule_text: Option<String>,
    pub success_count: u32,
    pub failure_count: u32,
    pub confidence: f64,
    /// `None` for the global bucket.
    #[serde(default)]
    pub domain_scope: Option<String>,
    pub lifecycle: PatternLifecycle,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl PatternRecord {
    pub fn observations(&self) -> u32 {
        self.success_count + self.failure_count
    }

    /// Recompute a record from the entries of one signature/bucket.
    ///
    /// Returns `None` when no entry falls in the bucket.
    pub fn derive<'a>(
        signature: &IssueSignature,
        domain_scope: Option<&str>,
        entries: impl IntoIterator<Item = &'a FeedbackEntry>,
        policy: &SynthesisPolicy,
    ) -> Option<Self> {
        let mut success = 0u32;
        let mut failure = 0u32;
        let mut first_seen: Option<DateTime<Utc>> = None;
        let mut last_updated: Option<DateTime<Utc>> = None;
        let mut successful_texts: Vec<&str> = Vec::new();

        for entry in entries {
            if let Some(scope) = domain_scope {
                if entry.domain.as_deref() != Some(scope) {
                    continue;
                }
            }
            if entry.rating.is_success() {
                success += 1;
                if let Some(text) = entry.rule_text.as_deref() {
                    successful_texts.push(text);
                }
            } else {
                failure += 1;
            }
            first_seen = Some(first_seen.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
            last_updated = Some(last_updated.map_or(entry.timestamp, |t| t.max(entry.timestamp)));
        }

        let (first_seen, last_updated) = (first_seen?, last_updated?);
        let confidence = frequency(success, failure);
        Some(Self {
            signature: signature.clone(),
            rule_text: majority_vote(&successful_texts).map(str::to_string),
            success_count: success,
            failure_count: failure,
            confidence,
            domain_scope: domain_scope.map(str::to_string),
            lifecycle: PatternLifecycle::from_stats(confidence, success + failure, policy),
            first_seen,
            last_updated,
        })
    }
}

/// Most frequent value by literal equality; ties go to the earliest first seen.
pub fn majority_vote<'a>(values: &[&'a str]) -> Option<&'a str> {
    let mut counts: HashMap<&'a str, (usize, usize)> = HashMap::new();
    for (index, value) in values.iter().enumerate() {
        counts.entry(*value).or_insert((0, index)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, ia)), (_, (cb, ib))| ca.cmp(cb).then(ib.cmp(ia)))
        .map(|(value, _)| value)
}
