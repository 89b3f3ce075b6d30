//! The provider adapter contract.
//!
//! One adapter wraps one external compute backend. Adapters are stateless
//! with respect to jobs: input mapping is pure, submission failures are
//! never retried inside the adapter, and webhook parsing normalizes the
//! provider-native callback into the common [`WebhookResult`] currency.

use crate::error::ForgeResult;
use crate::input::GenerationInput;
use crate::job::Job;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The provider blocked until the artifact was ready (synchronous API).
    /// Inline payloads have already been persisted; only references remain.
    Completed {
        /// Durable locators of the generated media
        outputs: Vec<String>,
        /// Wall-clock time the provider call took
        elapsed: Duration,
    },
    /// The provider accepted the job and will report completion out-of-band.
    Accepted {
        /// Provider-side prediction/request id
        handle: String,
    },
}

/// Normalized status of an asynchronous callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Generation finished with outputs
    Completed,
    /// Generation failed
    Failed,
}

/// Normalized outcome parsed from a provider's asynchronous callback.
///
/// The common currency all adapters must produce from their native webhook
/// formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResult {
    /// Provider-side prediction/request id
    pub handle: String,
    /// Outcome
    pub status: WebhookStatus,
    /// Validated media locators (success only)
    pub outputs: Vec<String>,
    /// Error text (failure only)
    pub error: Option<String>,
    /// Provider execution logs, when echoed back
    pub logs: Option<String>,
}

/// Uniform interface over one external compute backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Stable provider name used in chains, counters, and job records
    fn name(&self) -> &str;

    /// Map the generic parameters into the provider's native request shape.
    ///
    /// Pure and stateless; must not mutate its arguments. Called once per
    /// submit attempt so a fallback to another provider re-maps from the
    /// original generic input.
    fn map_input(
        &self,
        input: &GenerationInput,
        provider_model: &str,
    ) -> ForgeResult<serde_json::Value>;

    /// Submit the job to the backend.
    ///
    /// Failures are returned, never retried here; fallback is entirely the
    /// orchestrator's responsibility.
    async fn submit(
        &self,
        job: &Job,
        provider_model: &str,
        payload: &serde_json::Value,
    ) -> ForgeResult<SubmitOutcome>;

    /// Callback URL the provider should notify, if the backend is
    /// asynchronous. `None` for synchronous backends.
    fn webhook_url(&self) -> Option<String>;

    /// Normalize a provider-native callback body.
    fn parse_webhook(&self, raw: &serde_json::Value) -> ForgeResult<WebhookResult>;
}

/// File extensions accepted as generated media.
const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "mp4", "webm", "mov",
];

/// Host suffixes of known provider delivery CDNs, accepted even without a
/// recognizable file extension.
const MEDIA_HOST_SUFFIXES: &[&str] = &[
    "replicate.delivery",
    "fal.media",
    "fal.ai",
    "runpod.io",
    "amazonaws.com",
    "storage.googleapis.com",
];

/// Whether a string claimed by a provider plausibly locates generated media.
///
/// Providers may echo arbitrary strings on error paths, so output lists are
/// filtered through this check before being trusted.
#[must_use]
pub fn is_plausible_media_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };

    if url.scheme() != "https" && url.scheme() != "http" {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };

    if MEDIA_HOST_SUFFIXES
        .iter()
        .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
    {
        return true;
    }

    let path = url.path().to_ascii_lowercase();
    MEDIA_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{ext}")))
}

/// Keep only the plausible media locators from a provider-claimed list.
#[must_use]
pub fn filter_media_urls<I, S>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .filter(|c| is_plausible_media_url(c.as_ref()))
        .map(|c| c.as_ref().to_string())
        .collect()
}
