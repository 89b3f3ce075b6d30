//! Fireworks provider implementation.
//!
//! The only synchronous backend: the image generation API blocks until the
//! artifact is ready and returns base64 payloads inline. The adapter
//! persists those payloads to the artifact store before returning, since
//! job records only carry references.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use forge_core::{
    ArtifactStore, ForgeError, ForgeResult, GenerationInput, GenerationProvider, Job,
    SubmitOutcome, WebhookResult,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Fireworks provider configuration
#[derive(Debug, Clone)]
pub struct FireworksConfig {
    /// API key
    pub api_key: SecretString,
    /// API base URL
    pub base_url: String,
    /// Request timeout; generation happens within this window
    pub timeout: Duration,
}

impl FireworksConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.fireworks.ai/inference".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Override the base URL (testing/self-hosted gateways)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Synchronous Fireworks image provider
pub struct FireworksProvider {
    config: FireworksConfig,
    client: Client,
    artifacts: Arc<dyn ArtifactStore>,
}

impl FireworksProvider {
    /// Create a new provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: FireworksConfig, artifacts: Arc<dyn ArtifactStore>) -> ForgeResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| ForgeError::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            artifacts,
        })
    }

    fn endpoint_url(&self, model: &str) -> String {
        format!(
            "{}/v1/image_generation/accounts/fireworks/models/{model}",
            self.config.base_url
        )
    }

    /// Map an error response body to a typed error
    fn parse_error(status: u16, body: &str) -> ForgeError {
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: ErrorDetail,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: String,
        }

        let message = serde_json::from_str::<ErrorResponse>(body)
            .map_or_else(|_| format!("HTTP {status}: {body}"), |e| e.error.message);

        match status {
            400 | 422 => ForgeError::provider("fireworks", message, Some(status), false),
            401 | 403 => ForgeError::provider("fireworks", message, Some(status), false),
            429 => ForgeError::provider("fireworks", message, Some(status), true),
            500..=599 => ForgeError::provider("fireworks", message, Some(status), true),
            _ => ForgeError::provider("fireworks", message, Some(status), false),
        }
    }

    fn decode_images(response: &FireworksResponse) -> ForgeResult<Vec<Bytes>> {
        if response.images.is_empty() {
            return Err(ForgeError::provider(
                "fireworks",
                "response contained no images",
                None,
                false,
            ));
        }
        response
            .images
            .iter()
            .map(|image| {
                base64::engine::general_purpose::STANDARD
                    .decode(&image.base64)
                    .map(Bytes::from)
                    .map_err(|e| {
                        ForgeError::provider(
                            "fireworks",
                            format!("invalid base64 payload: {e}"),
                            None,
                            false,
                        )
                    })
            })
            .collect()
    }
}

#[async_trait]
impl GenerationProvider for FireworksProvider {
    fn name(&self) -> &str {
        "fireworks"
    }

    fn map_input(
        &self,
        input: &GenerationInput,
        _provider_model: &str,
    ) -> ForgeResult<serde_json::Value> {
        let prompt = input
            .prompt()
            .ok_or_else(|| ForgeError::validation("prompt is required"))?;

        let request = FireworksRequest {
            prompt: prompt.to_string(),
            negative_prompt: input.negative_prompt().map(str::to_string),
            width: input.width(),
            height: input.height(),
            samples: input.num_outputs(),
            seed: input.seed(),
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
        let url = self.endpoint_url(provider_model);
        let started = Instant::now();

        debug!(
            provider = "fireworks",
            model = %provider_model,
            job_id = %job.id,
            "submitting synchronous generation"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Fireworks request failed");
                ForgeError::provider("fireworks", format!("request failed: {e}"), None, true)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ForgeError::provider(
                "fireworks",
                format!("failed to read response: {e}"),
                None,
                false,
            )
        })?;

        if !status.is_success() {
            return Err(Self::parse_error(status.as_u16(), &body));
        }

        let parsed: FireworksResponse = serde_json::from_str(&body).map_err(|e| {
            ForgeError::provider(
                "fireworks",
                format!("invalid response JSON: {e}"),
                None,
                false,
            )
        })?;

        // Persist inline payloads; the job record only carries references.
        let mut outputs = Vec::new();
        for (index, data) in Self::decode_images(&parsed)?.into_iter().enumerate() {
            let key = format!("{}/{index}.png", job.id);
            let url = self.artifacts.put(&key, "image/png", data).await?;
            outputs.push(url);
        }

        let elapsed = started.elapsed();
        debug!(
            provider = "fireworks",
            job_id = %job.id,
            outputs = outputs.len(),
            elapsed_ms = elapsed.as_millis(),
            "synchronous generation complete"
        );

        Ok(SubmitOutcome::Completed { outputs, elapsed })
    }

    fn webhook_url(&self) -> Option<String> {
        None
    }

    fn parse_webhook(&self, _raw: &serde_json::Value) -> ForgeResult<WebhookResult> {
        Err(ForgeError::provider(
            "fireworks",
            "synchronous provider does not deliver webhooks",
            None,
            false,
        ))
    }
}

// Fireworks API types

#[derive(Debug, Serialize)]
struct FireworksRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    samples: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FireworksResponse {
    images: Vec<FireworksImage>,
}

#[derive(Debug, Deserialize)]
struct FireworksImage {
    base64: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::MemoryArtifactStore;
    use serde_json::json;

    fn provider() -> FireworksProvider {
        FireworksProvider::new(
            FireworksConfig::new("test-key"),
            Arc::new(MemoryArtifactStore::default()),
        )
        .expect("provider")
    }

    fn input(value: serde_json::Value) -> GenerationInput {
        serde_json::from_value(value).expect("valid input")
    }

    #[test]
    fn test_endpoint_url() {
        let provider = provider();
        assert_eq!(
            provider.endpoint_url("stable-diffusion-xl-1024-v1-0"),
            "https://api.fireworks.ai/inference/v1/image_generation/accounts/fireworks/models/stable-diffusion-xl-1024-v1-0"
        );
    }

    #[test]
    fn test_map_input() {
        let provider = provider();
        let payload = provider
            .map_input(
                &input(json!({
                    "prompt": "a watchtower",
                    "negative_prompt": "blurry",
                    "width": 1024,
                    "height": 1024,
                    "num_outputs": 2,
                    "seed": 7,
                })),
                "sdxl",
            )
            .expect("map");

        assert_eq!(
            payload,
            json!({
                "prompt": "a watchtower",
                "negative_prompt": "blurry",
                "width": 1024,
                "height": 1024,
                "samples": 2,
                "seed": 7,
            })
        );
    }

    #[test]
    fn test_map_input_omits_absent_fields() {
        let provider = provider();
        let payload = provider
            .map_input(&input(json!({ "prompt": "x" })), "sdxl")
            .expect("map");

        assert_eq!(payload, json!({ "prompt": "x", "samples": 1 }));
    }

    #[test]
    fn test_map_input_requires_prompt() {
        let provider = provider();
        let err = provider
            .map_input(&input(json!({ "width": 512 })), "sdxl")
            .expect_err("must fail");
        assert!(matches!(err, ForgeError::Validation { .. }));
    }

    #[test]
    fn test_no_webhook() {
        let provider = provider();
        assert!(provider.webhook_url().is_none());
        assert!(provider.parse_webhook(&json!({})).is_err());
    }

    #[test]
    fn test_parse_error_retryable_classes() {
        let err = FireworksProvider::parse_error(503, r#"{"error":{"message":"overloaded"}}"#);
        assert!(err.is_retryable());
        match err {
            ForgeError::Provider { message, .. } => assert_eq!(message, "overloaded"),
            other => panic!("unexpected: {other:?}"),
        }

        assert!(FireworksProvider::parse_error(429, "{}").is_retryable());
        assert!(!FireworksProvider::parse_error(422, "bad params").is_retryable());
        assert!(!FireworksProvider::parse_error(401, "{}").is_retryable());
    }

    #[test]
    fn test_decode_images() {
        let response = FireworksResponse {
            images: vec![FireworksImage {
                base64: base64::engine::general_purpose::STANDARD.encode(b"png-bytes"),
            }],
        };

        let decoded = FireworksProvider::decode_images(&response).expect("decode");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], Bytes::from_static(b"png-bytes"));
    }

    #[test]
    fn test_decode_images_rejects_bad_base64() {
        let response = FireworksResponse {
            images: vec![FireworksImage {
                base64: "!!not-base64!!".to_string(),
            }],
        };
        assert!(FireworksProvider::decode_images(&response).is_err());
    }

    #[test]
    fn test_decode_images_rejects_empty() {
        let response = FireworksResponse { images: vec![] };
        assert!(FireworksProvider::decode_images(&response).is_err());
    }
}
