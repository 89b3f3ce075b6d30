//! Replicate provider implementation.
//!
//! Asynchronous predictions API: submission returns a prediction id and the
//! terminal outcome arrives later on the configured webhook.
//!
//! # API Formats
//! - Versioned models: `POST /v1/predictions` with a `version` hash
//! - Official models: `POST /v1/models/{owner}/{name}/predictions`

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

/// Replicate provider configuration
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// API token
    pub api_token: SecretString,
    /// API base URL
    pub base_url: String,
    /// Public base URL of this service, for webhook callbacks
    pub webhook_base: String,
    /// Request timeout for the submission call
    pub timeout: Duration,
}

impl ReplicateConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(api_token: impl Into<String>, webhook_base: impl Into<String>) -> Self {
        Self {
            api_token: SecretString::new(api_token.into()),
            base_url: "https://api.replicate.com".to_string(),
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

/// Asynchronous Replicate provider
pub struct ReplicateProvider {
    config: ReplicateConfig,
    client: Client,
}

impl ReplicateProvider {
    /// Create a new provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: ReplicateConfig) -> ForgeResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| ForgeError::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Endpoint and body wrapper for a model string.
    ///
    /// An `owner/name` path targets the official-models endpoint; anything
    /// else is treated as a version hash on the generic endpoint.
    fn request_parts(&self, provider_model: &str, input: Value) -> (String, Value) {
        let webhook = self.webhook_url();
        if provider_model.contains('/') {
            (
                format!(
                    "{}/v1/models/{provider_model}/predictions",
                    self.config.base_url
                ),
                serde_json::json!({
                    "input": input,
                    "webhook": webhook,
                    "webhook_events_filter": ["completed"],
                }),
            )
        } else {
            (
                format!("{}/v1/predictions", self.config.base_url),
                serde_json::json!({
                    "version": provider_model,
                    "input": input,
                    "webhook": webhook,
                    "webhook_events_filter": ["completed"],
                }),
            )
        }
    }

    fn parse_error(status: u16, body: &str) -> ForgeError {
        #[derive(Deserialize)]
        struct ErrorResponse {
            detail: String,
        }

        let message = serde_json::from_str::<ErrorResponse>(body)
            .map_or_else(|_| format!("HTTP {status}: {body}"), |e| e.detail);

        match status {
            400 | 422 => ForgeError::provider("replicate", message, Some(status), false),
            401 | 402 | 403 => ForgeError::provider("replicate", message, Some(status), false),
            429 => ForgeError::provider("replicate", message, Some(status), true),
            500..=599 => ForgeError::provider("replicate", message, Some(status), true),
            _ => ForgeError::provider("replicate", message, Some(status), false),
        }
    }
}

#[async_trait]
impl GenerationProvider for ReplicateProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    fn map_input(
        &self,
        input: &GenerationInput,
        _provider_model: &str,
    ) -> ForgeResult<serde_json::Value> {
        let prompt = input
            .prompt()
            .ok_or_else(|| ForgeError::validation("prompt is required"))?;

        let request = ReplicateInput {
            prompt: prompt.to_string(),
            negative_prompt: input.negative_prompt().map(str::to_string),
            width: input.width(),
            height: input.height(),
            num_outputs: input.num_outputs(),
            seed: input.seed(),
            image: input
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
        let (url, body) = self.request_parts(provider_model, payload.clone());

        debug!(
            provider = "replicate",
            model = %provider_model,
            job_id = %job.id,
            "creating prediction"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Replicate request failed");
                ForgeError::provider("replicate", format!("request failed: {e}"), None, true)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ForgeError::provider(
                "replicate",
                format!("failed to read response: {e}"),
                None,
                false,
            )
        })?;

        if !status.is_success() {
            return Err(Self::parse_error(status.as_u16(), &body));
        }

        let prediction: PredictionResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::provider(
                "replicate",
                format!("invalid response JSON: {e}"),
                None,
                false,
            )
        })?;

        debug!(
            provider = "replicate",
            job_id = %job.id,
            handle = %prediction.id,
            "prediction accepted"
        );

        Ok(SubmitOutcome::Accepted {
            handle: prediction.id,
        })
    }

    fn webhook_url(&self) -> Option<String> {
        Some(format!("{}/webhooks/replicate", self.config.webhook_base))
    }

    fn parse_webhook(&self, raw: &serde_json::Value) -> ForgeResult<WebhookResult> {
        let callback: PredictionWebhook = serde_json::from_value(raw.clone())
            .map_err(|e| ForgeError::validation(format!("malformed Replicate webhook: {e}")))?;

        match callback.status.as_str() {
            "succeeded" => {
                // Output may be a single URL or a list; providers can echo
                // arbitrary strings on error paths, so validate each one.
                let candidates: Vec<String> = match callback.output {
                    Some(Value::String(url)) => vec![url],
                    Some(Value::Array(items)) => items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };

                Ok(WebhookResult {
                    handle: callback.id,
                    status: WebhookStatus::Completed,
                    outputs: filter_media_urls(candidates),
                    error: None,
                    logs: callback.logs,
                })
            }
            "failed" | "canceled" => Ok(WebhookResult {
                handle: callback.id,
                status: WebhookStatus::Failed,
                outputs: Vec::new(),
                error: callback.error,
                logs: callback.logs,
            }),
            other => Err(ForgeError::validation(format!(
                "non-terminal Replicate webhook status: {other}"
            ))),
        }
    }
}

// Replicate API types

#[derive(Debug, Serialize)]
struct ReplicateInput {
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
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PredictionWebhook {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    logs: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> ReplicateProvider {
        ReplicateProvider::new(ReplicateConfig::new("r8_test", "https://forge.example.com"))
            .expect("provider")
    }

    fn input(value: serde_json::Value) -> GenerationInput {
        serde_json::from_value(value).expect("valid input")
    }

    #[test]
    fn test_webhook_url() {
        assert_eq!(
            provider().webhook_url().as_deref(),
            Some("https://forge.example.com/webhooks/replicate")
        );
    }

    #[test]
    fn test_map_input_with_keyframe() {
        let payload = provider()
            .map_input(
                &input(json!({
                    "prompt": "a drone shot",
                    "keyframe_url": "https://cdn.test/frame.png",
                })),
                "flux-dev",
            )
            .expect("map");

        assert_eq!(payload["prompt"], "a drone shot");
        assert_eq!(payload["image"], "https://cdn.test/frame.png");
        assert_eq!(payload["num_outputs"], 1);
    }

    #[test]
    fn test_image_url_takes_precedence_over_keyframe() {
        let payload = provider()
            .map_input(
                &input(json!({
                    "prompt": "x",
                    "image_url": "https://cdn.test/src.png",
                    "keyframe_url": "https://cdn.test/frame.png",
                })),
                "flux-dev",
            )
            .expect("map");

        assert_eq!(payload["image"], "https://cdn.test/src.png");
    }

    #[test]
    fn test_request_parts_official_model() {
        let (url, body) = provider().request_parts(
            "black-forest-labs/flux-dev",
            json!({ "prompt": "x" }),
        );

        assert_eq!(
            url,
            "https://api.replicate.com/v1/models/black-forest-labs/flux-dev/predictions"
        );
        assert!(body.get("version").is_none());
        assert_eq!(
            body["webhook"],
            "https://forge.example.com/webhooks/replicate"
        );
        assert_eq!(body["webhook_events_filter"], json!(["completed"]));
    }

    #[test]
    fn test_request_parts_version_hash() {
        let (url, body) = provider().request_parts("5c7d5dc6", json!({ "prompt": "x" }));

        assert_eq!(url, "https://api.replicate.com/v1/predictions");
        assert_eq!(body["version"], "5c7d5dc6");
    }

    #[test]
    fn test_parse_webhook_succeeded_list() {
        let result = provider()
            .parse_webhook(&json!({
                "id": "pred-1",
                "status": "succeeded",
                "output": [
                    "https://replicate.delivery/pbxt/out-0.png",
                    "not a url",
                ],
            }))
            .expect("parse");

        assert_eq!(result.handle, "pred-1");
        assert_eq!(result.status, WebhookStatus::Completed);
        // The echoed garbage string is filtered out
        assert_eq!(
            result.outputs,
            vec!["https://replicate.delivery/pbxt/out-0.png".to_string()]
        );
    }

    #[test]
    fn test_parse_webhook_succeeded_scalar() {
        let result = provider()
            .parse_webhook(&json!({
                "id": "pred-2",
                "status": "succeeded",
                "output": "https://replicate.delivery/pbxt/out.mp4",
            }))
            .expect("parse");

        assert_eq!(result.outputs.len(), 1);
    }

    #[test]
    fn test_parse_webhook_failed() {
        let result = provider()
            .parse_webhook(&json!({
                "id": "pred-3",
                "status": "failed",
                "error": "CUDA out of memory",
                "logs": "step 1...",
            }))
            .expect("parse");

        assert_eq!(result.status, WebhookStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("CUDA out of memory"));
        assert_eq!(result.logs.as_deref(), Some("step 1..."));
        assert!(result.outputs.is_empty());
    }

    #[test]
    fn test_parse_webhook_non_terminal_rejected() {
        let err = provider()
            .parse_webhook(&json!({ "id": "pred-4", "status": "processing" }))
            .expect_err("must fail");
        assert!(matches!(err, ForgeError::Validation { .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = ReplicateProvider::parse_error(429, r#"{"detail":"rate limited"}"#);
        assert!(err.is_retryable());

        let err = ReplicateProvider::parse_error(422, r#"{"detail":"invalid input"}"#);
        assert!(!err.is_retryable());
    }
}
