//! Fal provider implementation.
//!
//! Asynchronous queue API: jobs are submitted to `queue.fal.run` with a
//! `fal_webhook` query parameter and the terminal outcome arrives on the
//! webhook with the result payload embedded.

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

/// Fal provider configuration
#[derive(Debug, Clone)]
pub struct FalConfig {
    /// API key
    pub api_key: SecretString,
    /// Queue base URL
    pub base_url: String,
    /// Public base URL of this service, for webhook callbacks
    pub webhook_base: String,
    /// Request timeout for the submission call
    pub timeout: Duration,
}

impl FalConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(api_key: impl Into<String>, webhook_base: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://queue.fal.run".to_string(),
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

/// Asynchronous Fal queue provider
pub struct FalProvider {
    config: FalConfig,
    client: Client,
}

impl FalProvider {
    /// Create a new provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: FalConfig) -> ForgeResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| ForgeError::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn submit_url(&self, provider_model: &str) -> String {
        let webhook = self.webhook_url().unwrap_or_default();
        format!(
            "{}/{provider_model}?fal_webhook={webhook}",
            self.config.base_url
        )
    }

    fn parse_error(status: u16, body: &str) -> ForgeError {
        #[derive(Deserialize)]
        struct ErrorResponse {
            detail: Value,
        }

        let message = serde_json::from_str::<ErrorResponse>(body).map_or_else(
            |_| format!("HTTP {status}: {body}"),
            |e| match e.detail {
                Value::String(s) => s,
                other => other.to_string(),
            },
        );

        match status {
            400 | 422 => ForgeError::provider("fal", message, Some(status), false),
            401 | 402 | 403 => ForgeError::provider("fal", message, Some(status), false),
            429 => ForgeError::provider("fal", message, Some(status), true),
            500..=599 => ForgeError::provider("fal", message, Some(status), true),
            _ => ForgeError::provider("fal", message, Some(status), false),
        }
    }

    /// Collect media candidates from the webhook result payload.
    ///
    /// Image models return `images: [{url}]`; video models return
    /// `video: {url}`; some return a single `image: {url}`.
    fn payload_candidates(payload: &Value) -> Vec<String> {
        let mut candidates = Vec::new();

        if let Some(images) = payload.get("images").and_then(Value::as_array) {
            for image in images {
                if let Some(url) = image.get("url").and_then(Value::as_str) {
                    candidates.push(url.to_string());
                }
            }
        }
        for key in ["video", "image"] {
            if let Some(url) = payload
                .get(key)
                .and_then(|v| v.get("url"))
                .and_then(Value::as_str)
            {
                candidates.push(url.to_string());
            }
        }
        candidates
    }
}

#[async_trait]
impl GenerationProvider for FalProvider {
    fn name(&self) -> &str {
        "fal"
    }

    fn map_input(
        &self,
        input: &GenerationInput,
        _provider_model: &str,
    ) -> ForgeResult<serde_json::Value> {
        let prompt = input
            .prompt()
            .ok_or_else(|| ForgeError::validation("prompt is required"))?;

        let image_size = match (input.width(), input.height()) {
            (Some(width), Some(height)) => Some(FalImageSize { width, height }),
            _ => None,
        };

        let request = FalInput {
            prompt: prompt.to_string(),
            negative_prompt: input.negative_prompt().map(str::to_string),
            image_size,
            num_images: input.num_outputs(),
            seed: input.seed(),
            image_url: input
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
        let url = self.submit_url(provider_model);

        debug!(
            provider = "fal",
            model = %provider_model,
            job_id = %job.id,
            "queueing request"
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Key {}", self.config.api_key.expose_secret()),
            )
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Fal request failed");
                ForgeError::provider("fal", format!("request failed: {e}"), None, true)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ForgeError::provider("fal", format!("failed to read response: {e}"), None, false)
        })?;

        if !status.is_success() {
            return Err(Self::parse_error(status.as_u16(), &body));
        }

        let queued: QueueResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::provider("fal", format!("invalid response JSON: {e}"), None, false)
        })?;

        debug!(
            provider = "fal",
            job_id = %job.id,
            handle = %queued.request_id,
            "request queued"
        );

        Ok(SubmitOutcome::Accepted {
            handle: queued.request_id,
        })
    }

    fn webhook_url(&self) -> Option<String> {
        Some(format!("{}/webhooks/fal", self.config.webhook_base))
    }

    fn parse_webhook(&self, raw: &serde_json::Value) -> ForgeResult<WebhookResult> {
        let callback: FalWebhook = serde_json::from_value(raw.clone())
            .map_err(|e| ForgeError::validation(format!("malformed Fal webhook: {e}")))?;

        match callback.status.as_str() {
            "OK" => {
                let candidates = callback
                    .payload
                    .as_ref()
                    .map(Self::payload_candidates)
                    .unwrap_or_default();

                Ok(WebhookResult {
                    handle: callback.request_id,
                    status: WebhookStatus::Completed,
                    outputs: filter_media_urls(candidates),
                    error: None,
                    logs: None,
                })
            }
            "ERROR" => Ok(WebhookResult {
                handle: callback.request_id,
                status: WebhookStatus::Failed,
                outputs: Vec::new(),
                error: callback.error.or(callback.payload_error),
                logs: None,
            }),
            other => Err(ForgeError::validation(format!(
                "unknown Fal webhook status: {other}"
            ))),
        }
    }
}

// Fal API types

#[derive(Debug, Serialize)]
struct FalInput {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<FalImageSize>,
    num_images: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct FalImageSize {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct FalWebhook {
    request_id: String,
    status: String,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    payload_error: Option<String>,
}
