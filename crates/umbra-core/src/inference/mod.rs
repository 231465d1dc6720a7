//! Defect classification.
//!
//! A classifier maps one [`StyleSnapshot`] to a set of [`ProblemTag`]s with
//! no side effects. The strategy is picked once, when the session is built.

pub mod heuristic;
pub mod issue;
pub mod learned;

pub use heuristic::HeuristicClassifier;
pub use issue::{Issue, IssueSignature, ProblemTag};
pub use learned::{LearnedClassifier, LearnedModel, LearnedModelError};

use crate::collect::StyleSnapshot;
use std::collections::BTreeSet;
use umbra_config::ClassifierThresholds;

/// Snapshot → problem tags.
pub trait DefectClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, snapshot: &StyleSnapshot) -> BTreeSet<ProblemTag>;
}

/// Classifier selection.
#[derive(Debug, Clone)]
pub enum ClassifierStrategy {
    Heuristic,
    Learned(LearnedModel),
}

pub fn build_classifier(
    strategy: ClassifierStrategy,
    thresholds: ClassifierThresholds,
) -> Box<dyn DefectClassifier> {
    match strategy {
        ClassifierStrategy::Heuristic => Box::new(HeuristicClassifier::new(thresholds)),
        ClassifierStrategy::Learned(model) => Box::new(LearnedClassifier::new(model, thresholds)),
    }
}

/// Classify every snapshot and keep those with at least one tag.
pub fn detect_issues(
    classifier: &dyn DefectClassifier,
    snapshots: Vec<StyleSnapshot>,
) -> Vec<Issue> {
    snapshots
        .into_iter()
        .filter_map(|snapshot| {
            let tags = classifier.classify(&snapshot);
            if tags.is_empty() {
                None
            } else {
                tracing::debug!(
                    node = %snapshot.node,
                    tags = ?tags,
                    classifier = classifier.name(),
                    "issue detected"
                );
                Some(Issue::new(snapshot, tags))
            }
        })
        .collect()
}
