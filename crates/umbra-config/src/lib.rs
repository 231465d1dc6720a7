//! Umbra configuration loading and validation.
//!
//! This crate provides:
//! - The typed `Policy` holding every detection and synthesis threshold
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation
//! - Config snapshots attached to store exports
//! - Named presets

pub mod policy;
pub mod preset;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use policy::{ClassifierThresholds, MonitorPolicy, Policy, StorePolicy, SynthesisPolicy};
pub use preset::{get_preset, list_presets, PresetError, PresetInfo, PresetName};
pub use resolve::{resolve_config, ConfigPaths, ResolvedConfig, CONFIG_ENV_VAR};
pub use snapshot::{ConfigSnapshot, ConfigSource};
pub use validate::{validate_policy, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// JSON Schema for `policy.json`.
pub fn policy_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Policy)).unwrap_or(serde_json::Value::Null)
}

impl From<ValidationError> for umbra_common::Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::IoError(msg) => umbra_common::Error::Config(msg),
            other => umbra_common::Error::InvalidPolicy(other.to_string()),
        }
    }
}
