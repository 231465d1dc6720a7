//! Learned classifier: per-tag logistic models over a fixed feature vector.
//!
//! The model file is produced offline. Each tag gets its own weight vector
//! and bias; a tag is emitted when `sigmoid(w·x + b)` reaches the decision
//! threshold. Tags missing from the model are never emitted.

use super::heuristic::{effective_contrast, matches_hint};
use super::{DefectClassifier, ProblemTag};
use crate::collect::{StyleSnapshot, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;
use umbra_config::ClassifierThresholds;
use umbra_math::{dot, relative_luminance, sigmoid};

/// Feature names, in vector order.
pub const FEATURE_NAMES: [&str; 14] = [
    "background_alpha",
    "background_luminance",
    "foreground_luminance",
    "contrast_ratio_scaled",
    "opacity",
    "hidden",
    "out_of_flow",
    "z_index_scaled",
    "width_fraction",
    "height_fraction",
    "has_border",
    "border_luminance",
    "menu_hint",
    "has_text",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

#[derive(Debug, Error)]
pub enum LearnedModelError {
    #[error("failed to read model {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("weights for {tag} have {found} entries, expected {expected}")]
    Dimension {
        tag: ProblemTag,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagWeights {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedModel {
    #[serde(default)]
    pub version: Option<String>,
    pub tags: BTreeMap<ProblemTag, TagWeights>,
}

impl LearnedModel {
    pub fn from_file(path: &Path) -> Result<Self, LearnedModelError> {
        let content = std::fs::read_to_string(path).map_err(|source| LearnedModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_json(&content)
    }

    pub fn parse_json(json: &str) -> Result<Self, LearnedModelError> {
        let model: LearnedModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), LearnedModelError> {
        for (tag, w) in &self.tags {
            if w.weights.len() != FEATURE_COUNT {
                return Err(LearnedModelError::Dimension {
                    tag: *tag,
                    found: w.weights.len(),
                    expected: FEATURE_COUNT,
                });
            }
        }
        Ok(())
    }
}

/// Numeric feature vector for one snapshot.
pub fn extract_features(snapshot: &StyleSnapshot, thresholds: &ClassifierThresholds) -> [f64; FEATURE_COUNT] {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let fraction = |v: f64, of: f64| if of > 0.0 { (v / of).clamp(0.0, 1.0) } else { 0.0 };

    [
        snapshot.background.a.clamp(0.0, 1.0),
        relative_luminance(snapshot.background),
        relative_luminance(snapshot.foreground),
        effective_contrast(snapshot).map(|r| r / 21.0).unwrap_or(1.0),
        snapshot.opacity,
        flag(snapshot.visibility == Visibility::Hidden),
        flag(snapshot.position.is_out_of_flow()),
        snapshot
            .z_index
            .map(|z| (z as f64 / 1000.0).clamp(0.0, 1.0))
            .unwrap_or(0.0),
        fraction(snapshot.width, snapshot.viewport.width),
        fraction(snapshot.height, snapshot.viewport.height),
        flag(snapshot.border_width > 0.0 && snapshot.border_color.a > 0.0),
        relative_luminance(snapshot.border_color) * snapshot.border_color.a.clamp(0.0, 1.0),
        flag(matches_hint(snapshot, &thresholds.menu_hints)),
        flag(snapshot.text_len > 0),
    ]
}

#[derive(Debug, Clone)]
pub struct LearnedClassifier {
    model: LearnedModel,
    thresholds: ClassifierThresholds,
}

impl LearnedClassifier {
    pub fn new(model: LearnedModel, thresholds: ClassifierThresholds) -> Self {
        Self { model, thresholds }
    }

    /// Per-tag probabilities for a snapshot.
    pub fn probabilities(&self, snapshot: &StyleSnapshot) -> BTreeMap<ProblemTag, f64> {
        let x = extract_features(snapshot, &self.thresholds);
        self.model
            .tags
            .iter()
            .map(|(tag, w)| (*tag, sigmoid(dot(&w.weights, &x) + w.bias)))
            .collect()
    }
}

impl DefectClassifier for LearnedClassifier {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn classify(&self, snapshot: &StyleSnapshot) -> BTreeSet<ProblemTag> {
        let cutoff = self.thresholds.learned_decision_threshold;
        self.probabilities(snapshot)
            .into_iter()
            .filter(|(_, p)| *p >= cutoff)
            .map(|(tag, _)| tag)
            .collect()
    }
}
