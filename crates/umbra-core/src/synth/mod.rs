//! Patch synthesis: issue → patch, or an explicit reason for no patch.
//!
//! Sources are tried in a fixed order:
//!
//! 1. **learned**: a servable pattern record for the issue signature
//! 2. **generated**: one request to the configured generator, bounded by
//!    the full-element timeout
//! 3. **template**: the element-type table, gated by element confidence
//!
//! A failed generation is final for this cycle. While the store is
//! degraded only templates are served, ungated and at forced-low confidence.

pub mod generator;
pub mod selector;
pub mod template;
pub mod validation;

pub use generator::{
    generate_with_timeout, GenerationFailure, GenerationKind, GenerationRequest, HttpGenerator,
    PatchGenerator,
};
pub use selector::stable_selector;
pub use template::template_rule;
pub use validation::{validate_payload, PayloadError};

use crate::inference::{Issue, IssueSignature};
use crate::store::PatternStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use umbra_common::{NodeId, PatchId};
use umbra_config::SynthesisPolicy;

/// Where a patch's rule text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Learned,
    Generated,
    Template,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Learned => "learned",
            SourceKind::Generated => "generated",
            SourceKind::Template => "template",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete fix for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: PatchId,
    pub node: NodeId,
    pub selector: String,
    /// Declaration body; every declaration ends in `!important;`.
    pub rule_text: String,
    pub source_kind: SourceKind,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub signature: IssueSignature,
}

impl Patch {
    fn build(issue: &Issue, rule_text: String, source_kind: SourceKind, confidence: f64) -> Self {
        Self {
            id: PatchId::new(),
            node: issue.node,
            selector: stable_selector(&issue.snapshot),
            rule_text,
            source_kind,
            confidence,
            created_at: Utc::now(),
            signature: issue.signature(),
        }
    }

    /// Full style block text.
    pub fn css(&self) -> String {
        format!("{} {{ {} }}", self.selector, self.rule_text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoPatchReason {
    Generation(GenerationFailure),
    NoTemplate { element_type: String },
    BelowTemplateGate { confidence: f64 },
}

impl fmt::Display for NoPatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoPatchReason::Generation(err) => write!(f, "generation failed: {}", err),
            NoPatchReason::NoTemplate { element_type } => {
                write!(f, "no template for <{}>", element_type)
            }
            NoPatchReason::BelowTemplateGate { confidence } => {
                write!(f, "element confidence {:.2} below template gate", confidence)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Synthesis {
    Patch(Patch),
    NoPatch(NoPatchReason),
}

impl Synthesis {
    pub fn patch(&self) -> Option<&Patch> {
        match self {
            Synthesis::Patch(p) => Some(p),
            Synthesis::NoPatch(_) => None,
        }
    }

    pub fn into_patch(self) -> Option<Patch> {
        match self {
            Synthesis::Patch(p) => Some(p),
            Synthesis::NoPatch(_) => None,
        }
    }
}

pub struct PatchSynthesizer {
    policy: SynthesisPolicy,
    generator: Option<Arc<dyn PatchGenerator>>,
}

impl PatchSynthesizer {
    pub fn new(policy: SynthesisPolicy) -> Self {
        Self {
            policy,
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn PatchGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub fn policy(&self) -> &SynthesisPolicy {
        &self.policy
    }

    pub async fn synthesize(&self, issue: &Issue, store: &PatternStore, domain: Option<&str>) -> Synthesis {
        if store.is_degraded() {
            return self.degraded_template(issue);
        }

        let signature = issue.signature();
        if let Some(record) = store.lookup(&signature, domain) {
            if let Some(rule) = record.rule_text.clone() {
                debug!(
                    node = %issue.node,
                    signature = %signature,
                    confidence = record.confidence,
                    "serving learned pattern"
                );
                return self.emit(Patch::build(issue, rule, SourceKind::Learned, record.confidence));
            }
        }

        if let Some(generator) = &self.generator {
            let request = GenerationRequest::for_issue(issue, GenerationKind::Fix);
            let result = generate_with_timeout(generator.as_ref(), &request, self.policy.generation_timeout())
                .await
                .and_then(|raw| Ok(validate_payload(&raw)?));
            return match result {
                Ok(rule) => self.emit(Patch::build(
                    issue,
                    rule,
                    SourceKind::Generated,
                    self.policy.generated_default_confidence,
                )),
                Err(err) => {
                    warn!(node = %issue.node, generator = generator.name(), error = %err, "generation failed");
                    Synthesis::NoPatch(NoPatchReason::Generation(err))
                }
            };
        }

        let element_type = &issue.snapshot.element_type;
        let confidence = store.element_confidence(element_type, domain);
        if confidence < self.policy.template_min_confidence {
            return Synthesis::NoPatch(NoPatchReason::BelowTemplateGate { confidence });
        }
        match template_rule(element_type, &issue.tags) {
            Some(rule) => self.emit(Patch::build(issue, rule, SourceKind::Template, confidence)),
            None => Synthesis::NoPatch(NoPatchReason::NoTemplate {
                element_type: element_type.clone(),
            }),
        }
    }

    /// Synthesize sequentially; one failure never stops the batch.
    /// Results line up with `issues`.
    pub async fn synthesize_batch(
        &self,
        issues: &[&Issue],
        store: &PatternStore,
        domain: Option<&str>,
    ) -> Vec<Synthesis> {
        let mut out = Vec::with_capacity(issues.len());
        for issue in issues {
            out.push(self.synthesize(issue, store, domain).await);
        }
        out
    }

    /// Conversational request about one element.
    pub async fn ask(&self, issue: &Issue, message: &str) -> Result<Patch, GenerationFailure> {
        let generator = self.generator.as_ref().ok_or(GenerationFailure::NotConfigured)?;
        let request = GenerationRequest::for_issue(
            issue,
            GenerationKind::Conversational {
                message: message.to_string(),
            },
        );
        let raw = generate_with_timeout(generator.as_ref(), &request, self.policy.conversational_timeout()).await?;
        let rule = validate_payload(&raw)?;
        Ok(Patch::build(
            issue,
            rule,
            SourceKind::Generated,
            self.policy.generated_default_confidence,
        ))
    }

    fn degraded_template(&self, issue: &Issue) -> Synthesis {
        match template_rule(&issue.snapshot.element_type, &issue.tags) {
            Some(rule) => self.emit(Patch::build(
                issue,
                rule,
                SourceKind::Template,
                self.policy.degraded_confidence,
            )),
            None => Synthesis::NoPatch(NoPatchReason::NoTemplate {
                element_type: issue.snapshot.element_type.clone(),
            }),
        }
    }

    fn emit(&self, patch: Patch) -> Synthesis {
        info!(
            target: "umbra::synth",
            patch = %patch.id,
            node = %patch.node,
            source = %patch.source_kind,
            confidence = patch.confidence,
            selector = %patch.selector,
            "patch synthesized"
        );
        Synthesis::Patch(patch)
    }
}
