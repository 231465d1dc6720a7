//! Remote generative capability.
//!
//! One request in, one textual payload out. The caller bounds every call
//! with a timeout; an expired call is dropped without notifying the remote
//! side and never retried here.

use super::validation::PayloadError;
use crate::inference::Issue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use umbra_config::SynthesisPolicy;

/// Environment variable holding the bearer token for [`HttpGenerator`].
pub const API_KEY_ENV_VAR: &str = "UMBRA_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationKind {
    /// Full-element fix for a detected issue.
    Fix,
    /// Free-form user request about one element.
    Conversational { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(flatten)]
    pub kind: GenerationKind,
    pub tag: String,
    pub classes: Vec<String>,
    pub identity_path: String,
    /// Identity path of the parent chain.
    pub structural_context: String,
    pub style_sample: BTreeMap<String, String>,
    pub description: String,
}

impl GenerationRequest {
    pub fn for_issue(issue: &Issue, kind: GenerationKind) -> Self {
        let snap = &issue.snapshot;
        let structural_context = snap
            .identity_path
            .rsplit_once('>')
            .map(|(parent, _)| parent.to_string())
            .unwrap_or_default();

        let mut style_sample = BTreeMap::new();
        style_sample.insert("background-color".to_string(), snap.background.to_css());
        style_sample.insert("color".to_string(), snap.foreground.to_css());
        style_sample.insert("border-color".to_string(), snap.border_color.to_css());
        style_sample.insert("border-width".to_string(), format!("{}px", snap.border_width));
        style_sample.insert("opacity".to_string(), format!("{}", snap.opacity));
        style_sample.insert("position".to_string(), snap.position.as_str().to_string());
        style_sample.insert(
            "z-index".to_string(),
            snap.z_index.map_or_else(|| "auto".to_string(), |z| z.to_string()),
        );

        Self {
            kind,
            tag: snap.element_type.clone(),
            classes: snap.classes.iter().cloned().collect(),
            identity_path: snap.identity_path.clone(),
            structural_context,
            style_sample,
            description: issue.describe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationFailure {
    #[error("no generator configured")]
    NotConfigured,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("generator returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("non-conforming payload: {0}")]
    Payload(#[from] PayloadError),
}

impl From<GenerationFailure> for umbra_common::Error {
    fn from(err: GenerationFailure) -> Self {
        match err {
            GenerationFailure::Timeout { seconds } => umbra_common::Error::GenerationTimeout { seconds },
            other => umbra_common::Error::Generation(other.to_string()),
        }
    }
}

/// Opaque `generate(request) -> text` capability.
#[async_trait]
pub trait PatchGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationFailure>;
}

/// Run one generation bounded by `limit`.
pub async fn generate_with_timeout(
    generator: &dyn PatchGenerator,
    request: &GenerationRequest,
    limit: Duration,
) -> Result<String, GenerationFailure> {
    match tokio::time::timeout(limit, generator.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationFailure::Timeout {
            seconds: limit.as_secs(),
        }),
    }
}

#[derive(Debug, Serialize)]
struct HttpRequestBody<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a GenerationRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpResponseBody {
    patch_text: String,
}

/// JSON-over-HTTP generator: POST the request, read `{ "patchText": ... }`.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    /// Build from policy; `None` when no endpoint is configured.
    pub fn from_policy(policy: &SynthesisPolicy) -> Option<Self> {
        let endpoint = policy.generator_endpoint.as_deref()?.trim();
        if endpoint.is_empty() {
            return None;
        }
        let api_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| !k.is_empty());
        Some(Self::new(endpoint, policy.generator_model.clone(), api_key))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PatchGenerator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationFailure> {
        let body = HttpRequestBody {
            model: &self.model,
            request,
        };
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| GenerationFailure::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenerationFailure::Status {
                status: status.as_u16(),
                message,
            });
        }
        let parsed = resp
            .json::<HttpResponseBody>()
            .await
            .map_err(|e| GenerationFailure::Transport(format!("invalid response body: {}", e)))?;
        debug!(
            endpoint = %self.endpoint,
            bytes = parsed.patch_text.len(),
            "generator responded"
        );
        Ok(parsed.patch_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::{ScanOptions, TreeScanner};
    use crate::host::fixtures::dropdown_page;
    use crate::host::HostTree;
    use crate::inference::{build_classifier, detect_issues, ClassifierStrategy};
    use umbra_config::ClassifierThresholds;

    struct Sleepy;

    #[async_trait]
    impl PatchGenerator for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationFailure> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("color: red;".to_string())
        }
    }

    fn dropdown_issue() -> Issue {
        let tree = dropdown_page();
        let out = TreeScanner::new().scan(&tree, tree.root(), ScanOptions::default());
        let clf = build_classifier(ClassifierStrategy::Heuristic, ClassifierThresholds::default());
        detect_issues(clf.as_ref(), out.snapshots).remove(0)
    }

    #[test]
    fn request_carries_parent_context_and_style_sample() {
        let req = GenerationRequest::for_issue(&dropdown_issue(), GenerationKind::Fix);
        assert_eq!(req.tag, "div");
        assert_eq!(req.classes, vec!["dropdown-menu".to_string()]);
        assert_eq!(req.structural_context, "html>body:0");
        assert_eq!(req.style_sample["z-index"], "500");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["kind"], "fix");
        assert!(json.get("identityPath").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generator_times_out() {
        let req = GenerationRequest::for_issue(&dropdown_issue(), GenerationKind::Fix);
        let err = generate_with_timeout(&Sleepy, &req, Duration::from_secs(20))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationFailure::Timeout { seconds: 20 });
    }

    #[test]
    fn no_endpoint_means_no_http_generator() {
        assert!(HttpGenerator::from_policy(&SynthesisPolicy::default()).is_none());
        let policy = SynthesisPolicy {
            generator_endpoint: Some("http://127.0.0.1:9/generate".to_string()),
            ..Default::default()
        };
        assert_eq!(HttpGenerator::from_policy(&policy).unwrap().endpoint(), "http://127.0.0.1:9/generate");
    }
}
