//! Semantic validation for policy files.

use crate::policy::Policy;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("unsupported schema version {found} (expected major {expected})")]
    SchemaVersion { found: String, expected: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("inconsistent policy: {0}")]
    Inconsistent(String),
}

/// Outcome of validating a policy: hard errors plus advisory warnings.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse into a `Result`, keeping the first error.
    pub fn into_result(self) -> Result<Vec<String>, ValidationError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.warnings),
        }
    }
}

fn check_probability(result: &mut ValidationResult, field: &'static str, value: f64) {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        result.errors.push(ValidationError::OutOfRange {
            field,
            value: value.to_string(),
        });
    }
}

/// Validate a policy's values and cross-field consistency.
pub fn validate_policy(policy: &Policy) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !umbra_common::schema::is_compatible(&policy.schema_version) {
        result.errors.push(ValidationError::SchemaVersion {
            found: policy.schema_version.clone(),
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
        });
    }

    let c = &policy.classifier;
    if c.min_box_px < 0.0 {
        result.errors.push(ValidationError::OutOfRange {
            field: "classifier.min_box_px",
            value: c.min_box_px.to_string(),
        });
    }
    if !(0.0..=1.0).contains(&c.max_viewport_fraction) || c.max_viewport_fraction == 0.0 {
        result.errors.push(ValidationError::OutOfRange {
            field: "classifier.max_viewport_fraction",
            value: c.max_viewport_fraction.to_string(),
        });
    }
    if !(1.0..=21.0).contains(&c.min_contrast_ratio) {
        result.errors.push(ValidationError::OutOfRange {
            field: "classifier.min_contrast_ratio",
            value: c.min_contrast_ratio.to_string(),
        });
    }
    check_probability(&mut result, "classifier.low_opacity_threshold", c.low_opacity_threshold);
    check_probability(&mut result, "classifier.light_border_luminance", c.light_border_luminance);
    check_probability(
        &mut result,
        "classifier.learned_decision_threshold",
        c.learned_decision_threshold,
    );
    if c.menu_hints.is_empty() {
        result
            .warnings
            .push("classifier.menu_hints is empty; transparent menus will never be detected".to_string());
    }

    let s = &policy.synthesis;
    check_probability(&mut result, "synthesis.learned_min_confidence", s.learned_min_confidence);
    check_probability(&mut result, "synthesis.template_min_confidence", s.template_min_confidence);
    check_probability(&mut result, "synthesis.stable_confidence", s.stable_confidence);
    check_probability(&mut result, "synthesis.demotion_confidence", s.demotion_confidence);
    check_probability(
        &mut result,
        "synthesis.generated_default_confidence",
        s.generated_default_confidence,
    );
    check_probability(&mut result, "synthesis.degraded_confidence", s.degraded_confidence);

    if s.demotion_confidence > s.learned_min_confidence {
        result.errors.push(ValidationError::Inconsistent(format!(
            "demotion_confidence ({}) exceeds learned_min_confidence ({})",
            s.demotion_confidence, s.learned_min_confidence
        )));
    }
    if s.generation_timeout_secs == 0 || s.conversational_timeout_secs == 0 {
        result.errors.push(ValidationError::Inconsistent(
            "generation timeouts must be non-zero".to_string(),
        ));
    }
    if s.learned_min_observations == 0 {
        result
            .warnings
            .push("synthesis.learned_min_observations is 0; a single rating can promote a pattern".to_string());
    }

    let m = &policy.monitor;
    if m.debounce_ms == 0 {
        result.errors.push(ValidationError::OutOfRange {
            field: "monitor.debounce_ms",
            value: "0".to_string(),
        });
    }
    if m.tick_ms != 0 && m.tick_ms < m.debounce_ms {
        result.warnings.push(format!(
            "monitor.tick_ms ({}) is shorter than debounce_ms ({}); ticks will preempt bursts",
            m.tick_ms, m.debounce_ms
        ));
    }

    if policy.store.namespace.trim().is_empty()
        || policy
            .store
            .namespace
            .contains(|c: char| c == '/' || c == '\\' || c == '.')
    {
        result.errors.push(ValidationError::OutOfRange {
            field: "store.namespace",
            value: policy.store.namespace.clone(),
        });
    }

    result
}
