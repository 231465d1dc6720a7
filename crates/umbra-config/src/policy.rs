//! Detection and synthesis policy.
//!
//! Every threshold used by the classifier, synthesizer, store, and change
//! monitor lives here. The defaults are empirically chosen cutoffs, not
//! derived optima, so all of them are overridable from `policy.json`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    pub schema_version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub classifier: ClassifierThresholds,

    #[serde(default)]
    pub synthesis: SynthesisPolicy,

    #[serde(default)]
    pub monitor: MonitorPolicy,

    #[serde(default)]
    pub store: StorePolicy,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            description: None,
            classifier: ClassifierThresholds::default(),
            synthesis: SynthesisPolicy::default(),
            monitor: MonitorPolicy::default(),
            store: StorePolicy::default(),
        }
    }
}

impl Policy {
    /// Load a policy from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::validate::ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::validate::ValidationError::IoError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse_json(&content)
    }

    /// Parse a policy from a JSON string.
    pub fn parse_json(json: &str) -> Result<Self, crate::validate::ValidationError> {
        serde_json::from_str(json).map_err(|e| {
            crate::validate::ValidationError::ParseError(format!("Invalid JSON: {}", e))
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Thresholds for the deterministic defect classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Stacking order above which a positioned box counts as an overlay.
    pub menu_min_z_index: i64,
    /// Minimum box edge, in CSS pixels, for overlay candidates.
    pub min_box_px: f64,
    /// Maximum box edge as a fraction of the viewport edge.
    pub max_viewport_fraction: f64,
    /// Contrast ratio below which text is flagged.
    pub min_contrast_ratio: f64,
    /// Channel value (0-255) every channel must exceed to count as white.
    pub white_channel_threshold: u8,
    /// Opacity below which a node is flagged.
    pub low_opacity_threshold: f64,
    /// Relative luminance above which a border colour is light.
    pub light_border_luminance: f64,
    /// Role/class/id fragments that suggest a menu, nav, or dialog.
    pub menu_hints: Vec<String>,
    /// Role/class/id fragments that rule an overlay out.
    pub exclusion_hints: Vec<String>,
    /// Probability cutoff for the learned classifier.
    pub learned_decision_threshold: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            menu_min_z_index: 100,
            min_box_px: 40.0,
            max_viewport_fraction: 0.9,
            min_contrast_ratio: 3.0,
            white_channel_threshold: 240,
            low_opacity_threshold: 0.5,
            light_border_luminance: 0.7,
            menu_hints: [
                "menu", "dropdown", "nav", "dialog", "popover", "popup", "listbox", "tooltip",
                "flyout", "submenu", "modal",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclusion_hints: ["backdrop", "overlay", "main", "content", "scrim", "mask"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            learned_decision_threshold: 0.5,
        }
    }
}

/// Synthesis gates and store-derived confidence cutoffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SynthesisPolicy {
    /// Minimum pattern confidence to serve a learned patch.
    pub learned_min_confidence: f64,
    /// Minimum observations behind a pattern before it is trusted.
    pub learned_min_observations: u32,
    /// Minimum element-type/domain confidence for template patches.
    pub template_min_confidence: f64,
    /// Same-domain observations needed before the domain bucket wins.
    pub domain_min_samples: u32,
    /// Confidence from which a pattern is considered stable.
    pub stable_confidence: f64,
    /// Observations needed for the stable lifecycle state.
    pub stable_min_observations: u32,
    /// Confidence under which a pattern is demoted (deprecated).
    pub demotion_confidence: f64,
    /// Confidence assigned to generated patches with no history.
    pub generated_default_confidence: f64,
    /// Confidence forced onto patches while the store is unavailable.
    pub degraded_confidence: f64,
    /// Timeout for full-element generation requests.
    pub generation_timeout_secs: u64,
    /// Timeout for conversational requests.
    pub conversational_timeout_secs: u64,
    /// Remote generator endpoint. `None` disables the generative path.
    pub generator_endpoint: Option<String>,
    /// Model identifier forwarded to the generator.
    pub generator_model: String,
}

impl Default for SynthesisPolicy {
    fn default() -> Self {
        Self {
            learned_min_confidence: 0.6,
            learned_min_observations: 3,
            template_min_confidence: 0.3,
            domain_min_samples: 2,
            stable_confidence: 0.8,
            stable_min_observations: 10,
            demotion_confidence: 0.3,
            generated_default_confidence: 0.5,
            degraded_confidence: 0.1,
            generation_timeout_secs: 20,
            conversational_timeout_secs: 15,
            generator_endpoint: None,
            generator_model: "default".to_string(),
        }
    }
}

impl SynthesisPolicy {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn conversational_timeout(&self) -> Duration {
        Duration::from_secs(self.conversational_timeout_secs)
    }
}

/// Change monitor timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MonitorPolicy {
    /// Quiet period that closes a mutation burst.
    pub debounce_ms: u64,
    /// Periodic rescan interval, independent of mutations. 0 disables ticks.
    pub tick_ms: u64,
    /// Upper bound on nodes visited per scan.
    pub max_nodes_per_scan: usize,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            tick_ms: 5_000,
            max_nodes_per_scan: 5_000,
        }
    }
}

impl MonitorPolicy {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Pattern store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StorePolicy {
    /// Fixed namespace the key-value store is addressed by.
    pub namespace: String,
    /// Overrides the XDG data directory.
    pub data_dir: Option<PathBuf>,
    /// Days an emitted patch stays in the catalog without a rating. 0 keeps them forever.
    pub catalog_retention_days: u32,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            namespace: "umbra".to_string(),
            data_dir: None,
            catalog_retention_days: 30,
        }
    }
}

impl StorePolicy {
    pub fn catalog_retention(&self) -> Option<chrono::Duration> {
        (self.catalog_retention_days > 0)
            .then(|| chrono::Duration::days(i64::from(self.catalog_retention_days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cutoffs() {
        let policy = Policy::default();
        assert_eq!(policy.classifier.menu_min_z_index, 100);
        assert_eq!(policy.classifier.white_channel_threshold, 240);
        assert_eq!(policy.synthesis.learned_min_confidence, 0.6);
        assert_eq!(policy.synthesis.learned_min_observations, 3);
        assert_eq!(policy.synthesis.template_min_confidence, 0.3);
        assert_eq!(policy.synthesis.generation_timeout(), Duration::from_secs(20));
        assert_eq!(policy.synthesis.conversational_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "schema_version": "1.0.0",
            "classifier": { "menu_min_z_index": 50 },
            "monitor": { "debounce_ms": 250 }
        }"#;
        let policy = Policy::parse_json(json).expect("parse");
        assert_eq!(policy.classifier.menu_min_z_index, 50);
        assert_eq!(policy.classifier.min_contrast_ratio, 3.0);
        assert_eq!(policy.monitor.debounce_ms, 250);
        assert_eq!(policy.monitor.tick_ms, 5_000);
        assert_eq!(policy.synthesis, SynthesisPolicy::default());
    }

    #[test]
    fn json_roundtrip_preserves_policy() {
        let policy = Policy::default();
        let parsed = Policy::parse_json(&policy.to_json()).expect("parse");
        assert_eq!(parsed, policy);
    }

    #[test]
    fn catalog_retention_zero_keeps_forever() {
        let mut store = StorePolicy::default();
        assert_eq!(store.catalog_retention(), Some(chrono::Duration::days(30)));
        store.catalog_retention_days = 0;
        assert_eq!(store.catalog_retention(), None);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = Policy::parse_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::validate::ValidationError::ParseError(_)));
    }
}
