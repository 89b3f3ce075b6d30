//! RunPod provider implementation.
//!
//! Asynchronous serverless endpoints: `POST /v2/{endpoint}/run` returns a
//! request id; the worker container reports the terminal outcome to the
//! webhook when it finishes (or times out / gets cancelled).

use async_trait::async_trait;
use forge_core::{
    filter_media_urls, ForgeError, ForgeResult, GenerationInput, GenerationProvider, Job,
    SubmitOutcome, WebhookResult, WebhookStatus,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// RunPod provider configuration
#[derive(Debug, Clone)]
pub struct RunpodConfig {
    /// API key
    pub api_key: SecretString,
    /// API base URL
    pub base_url: String,
    /// Public base URL of this service, for webhook callbacks
    pub webhook_base: String,
    /// Request timeout for the submission call
    pub timeout: Duration,
}

impl RunpodConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(api_key: impl Into<String>, webhook_base: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.runpod.ai".to_string(),
            webhook_base: webhook_base.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the submission timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Asynchronous RunPod serverless provider
pub struct RunpodProvider {
    config: RunpodConfig,
    client: Client,
}

impl RunpodProvider {
    /// Create a new provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: RunpodConfig) -> ForgeResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| ForgeError::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn run_url(&self, endpoint: &str) -> String {
        format!("{}/v2/{endpoint}/run", self.config.base_url)
    }

    fn parse_error(status: u16, body: &str) -> ForgeError {
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: String,
        }

        let message = serde_json::from_str::<ErrorResponse>(body)
            .map_or_else(|_| format!("HTTP {status}: {body}"), |e| e.error);

        match status {
            400 => ForgeError::provider("runpod", message, Some(status), false),
            401 | 403 => ForgeError::provider("runpod", message, Some(status), false),
            429 => ForgeError::provider("runpod", message, Some(status), true),
            500..=599 => ForgeError::provider("runpod", message, Some(status), true),
            _ => ForgeError::provider("runpod", message, Some(status), false),
        }
    }

    /// Collect media candidates from a worker output blob.
    ///
    /// Worker templates differ: some return `images: [..]` (urls or
    /// `{url}` objects), some a single `image_url`, some a bare list.
    fn output_candidates(output: &Value) -> Vec<String> {
        let mut candidates = Vec::new();

        match output {
            Value::Array(items) => {
                for item in items {
                    if let Some(url) = item.as_str() {
                        candidates.push(url.to_string());
                    }
                }
            }
            Value::Object(map) => {
                if let Some(images) = map.get("images").and_then(Value::as_array) {
                    for image in images {
                        match image {
                            Value::String(url) => candidates.push(url.clone()),
                            Value::Object(o) => {
                                if let Some(url) = o.get("url").and_then(Value::as_str) {
                                    candidates.push(url.to_string());
                                }
                            }
                            _ => {}
                        }
                    }
                }
                if let Some(url) = map.get("image_url").and_then(Value::as_str) {
                    candidates.push(url.to_string());
                }
                if let Some(url) = map.get("video_url").and_then(Value::as_str) {
                    candidates.push(url.to_string());
                }
            }
            _ => {}
        }
        candidates
    }
}

#[async_trait]
impl GenerationProvider for RunpodProvider {
    fn name(&self) -> &str {
        "runpod"
    }

    fn map_input(
        &self,
        input: &GenerationInput,
        _provider_model: &str,
    ) -> ForgeResult<serde_json::Value> {
        let prompt = input
            .prompt()
            .ok_or_else(|| ForgeError::validation("prompt is required"))?;

        let request = RunpodInput {
            prompt: prompt.to_string(),
            negative_prompt: input.negative_prompt().map(str::to_string),
            width: input.width(),
            height: input.height(),
            num_outputs: input.num_outputs(),
            seed: input.seed(),
            init_image: input
                .image_url()
                .or_else(|| input.keyframe_url())
                .map(str::to_string),
        };

        serde_json::to_value(request)
            .map_err(|e| ForgeError::internal(format!("failed to encode request: {e}")))
    }

    async fn submit(
        &self,
        job: &Job,
        provider_model: &str,
        payload: &serde_json::Value,
    ) -> ForgeResult<SubmitOutcome> {
        let url = self.run_url(provider_model);
        let body = serde_json::json!({
            "input": payload,
            "webhook": self.webhook_url(),
        });

        debug!(
            provider = "runpod",
            endpoint = %provider_model,
            job_id = %job.id,
            "submitting run"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "RunPod request failed");
                ForgeError::provider("runpod", format!("request failed: {e}"), None, true)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ForgeError::provider(
                "runpod",
                format!("failed to read response: {e}"),
                None,
                false,
            )
        })?;

        if !status.is_success() {
            return Err(Self::parse_error(status.as_u16(), &body));
        }

        let run: RunResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::provider("runpod", format!("invalid response JSON: {e}"), None, false)
        })?;

        debug!(
            provider = "runpod",
            job_id = %job.id,
            handle = %run.id,
            "run accepted"
        );

        Ok(SubmitOutcome::Accepted { handle: run.id })
    }

    fn webhook_url(&self) -> Option<String> {
        Some(format!("{}/webhooks/runpod", self.config.webhook_base))
    }

    fn parse_webhook(&self, raw: &serde_json::Value) -> ForgeResult<WebhookResult> {
        let callback: RunWebhook = serde_json::from_value(raw.clone())
            .map_err(|e| ForgeError::validation(format!("malformed RunPod webhook: {e}")))?;

        match callback.status.as_str() {
            "COMPLETED" => {
                let candidates = callback
                    .output
                    .as_ref()
                    .map(Self::output_candidates)
                    .unwrap_or_default();

                Ok(WebhookResult {
                    handle: callback.id,
                    status: WebhookStatus::Completed,
                    outputs: filter_media_urls(candidates),
                    error: None,
                    logs: None,
                })
            }
            "FAILED" | "TIMED_OUT" | "CANCELLED" => {
                // TIMED_OUT arrives with no error text; synthesize one so
                // classification sees the timeout.
                let error = callback.error.or_else(|| match callback.status.as_str() {
                    "TIMED_OUT" => Some("worker timed out".to_string()),
                    "CANCELLED" => Some("run cancelled".to_string()),
                    _ => None,
                });

                Ok(WebhookResult {
                    handle: callback.id,
                    status: WebhookStatus::Failed,
                    outputs: Vec::new(),
                    error,
                    logs: None,
                })
            }
            other => Err(ForgeError::validation(format!(
                "non-terminal RunPod webhook status: {other}"
            ))),
        }
    }
}

// RunPod API types

#[derive(Debug, Serialize)]
struct RunpodInput {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    num_outputs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    init_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunWebhook {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> RunpodProvider {
        RunpodProvider::new(RunpodConfig::new("rp-test", "https://forge.example.com"))
            .expect("provider")
    }

    fn input(value: serde_json::Value) -> GenerationInput {
        serde_json::from_value(value).expect("valid input")
    }

    #[test]
    fn test_run_url() {
        assert_eq!(
            provider().run_url("sdxl-endpoint"),
            "https://api.runpod.ai/v2/sdxl-endpoint/run"
        );
    }

    #[test]
    fn test_map_input() {
        let payload = provider()
            .map_input(
                &input(json!({
                    "prompt": "a harbor",
                    "width": 768,
                    "height": 768,
                    "image_url": "https://cdn.test/src.png",
                })),
                "sdxl-endpoint",
            )
            .expect("map");

        assert_eq!(payload["prompt"], "a harbor");
        assert_eq!(payload["init_image"], "https://cdn.test/src.png");
        assert_eq!(payload["num_outputs"], 1);
    }

    #[test]
    fn test_parse_webhook_completed_object_output() {
        let result = provider()
            .parse_webhook(&json!({
                "id": "run-1",
                "status": "COMPLETED",
                "output": {
                    "images": [
                        { "url": "https://bucket.s3.amazonaws.com/out-0.png" },
                        "https://bucket.s3.amazonaws.com/out-1.png",
                    ],
                },
            }))
            .expect("parse");

        assert_eq!(result.status, WebhookStatus::Completed);
        assert_eq!(result.outputs.len(), 2);
    }

    #[test]
    fn test_parse_webhook_completed_bare_list() {
        let result = provider()
            .parse_webhook(&json!({
                "id": "run-2",
                "status": "COMPLETED",
                "output": ["https://bucket.s3.amazonaws.com/clip.mp4"],
            }))
            .expect("parse");

        assert_eq!(result.outputs.len(), 1);
    }

    #[test]
    fn test_parse_webhook_failed() {
        let result = provider()
            .parse_webhook(&json!({
                "id": "run-3",
                "status": "FAILED",
                "error": "CUDA error: out of memory",
            }))
            .expect("parse");

        assert_eq!(result.status, WebhookStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("CUDA error: out of memory"));
    }

    #[test]
    fn test_parse_webhook_timed_out_synthesizes_error() {
        let result = provider()
            .parse_webhook(&json!({ "id": "run-4", "status": "TIMED_OUT" }))
            .expect("parse");

        assert_eq!(result.status, WebhookStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("worker timed out"));
    }

    #[test]
    fn test_parse_webhook_in_queue_rejected() {
        assert!(provider()
            .parse_webhook(&json!({ "id": "run-5", "status": "IN_QUEUE" }))
            .is_err());
    }

    #[test]
    fn test_output_candidates_ignores_junk() {
        let candidates = RunpodProvider::output_candidates(&json!({
            "images": [42, { "no_url": true }],
            "image_url": "https://bucket.s3.amazonaws.com/x.png",
        }));
        assert_eq!(
            candidates,
            vec!["https://bucket.s3.amazonaws.com/x.png".to_string()]
        );
    }
}
