//! Built-in policy presets.

use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("unknown preset '{0}' (expected one of: default, conservative, aggressive)")]
    Unknown(String),
}

/// Named preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetName {
    /// Shipped defaults.
    Default,
    /// Fewer, higher-confidence patches.
    Conservative,
    /// Patch more eagerly and trust learned rules sooner.
    Aggressive,
}

impl PresetName {
    pub const ALL: [PresetName; 3] = [
        PresetName::Default,
        PresetName::Conservative,
        PresetName::Aggressive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Default => "default",
            PresetName::Conservative => "conservative",
            PresetName::Aggressive => "aggressive",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PresetName::Default => "Shipped thresholds",
            PresetName::Conservative => {
                "Stricter detection, learned rules need more evidence, no low-confidence templates"
            }
            PresetName::Aggressive => {
                "Looser detection and earlier promotion of learned rules"
            }
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(PresetName::Default),
            "conservative" => Ok(PresetName::Conservative),
            "aggressive" => Ok(PresetName::Aggressive),
            other => Err(PresetError::Unknown(other.to_string())),
        }
    }
}

/// Summary row for `config presets`.
#[derive(Debug, Clone, Serialize)]
pub struct PresetInfo {
    pub name: PresetName,
    pub description: &'static str,
}

pub fn list_presets() -> Vec<PresetInfo> {
    PresetName::ALL
        .iter()
        .map(|name| PresetInfo {
            name: *name,
            description: name.description(),
        })
        .collect()
}

/// Build the policy for a preset.
pub fn get_preset(name: PresetName) -> Policy {
    let mut policy = Policy::default();
    match name {
        PresetName::Default => {}
        PresetName::Conservative => {
            policy.description = Some("conservative preset".to_string());
            policy.classifier.menu_min_z_index = 500;
            policy.classifier.min_contrast_ratio = 2.0;
            policy.classifier.low_opacity_threshold = 0.3;
            policy.synthesis.learned_min_confidence = 0.75;
            policy.synthesis.learned_min_observations = 5;
            policy.synthesis.template_min_confidence = 0.5;
            policy.synthesis.domain_min_samples = 3;
        }
        PresetName::Aggressive => {
            policy.description = Some("aggressive preset".to_string());
            policy.classifier.menu_min_z_index = 10;
            policy.classifier.min_contrast_ratio = 4.5;
            policy.classifier.white_channel_threshold = 225;
            policy.synthesis.learned_min_confidence = 0.5;
            policy.synthesis.learned_min_observations = 2;
            policy.synthesis.template_min_confidence = 0.2;
            policy.synthesis.demotion_confidence = 0.2;
            policy.monitor.debounce_ms = 250;
        }
    }
    policy
}
