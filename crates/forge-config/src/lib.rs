//! # Forge Config
//!
//! Configuration loading for MediaForge: a YAML file (path from
//! `FORGE_CONFIG`, default `forge.yaml`) with environment overrides for the
//! common deployment knobs. A missing file yields the built-in defaults,
//! including a starter model catalog.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use forge_core::{MediaKind, ModelSpec, ProviderModelRef};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Configuration load error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path that failed
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
    /// File could not be parsed
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed
        path: String,
        /// Underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Worker loop settings
    pub workers: WorkersConfig,
    /// Chain filter settings
    pub routing: RoutingConfig,
    /// Public base URL used for provider webhook callbacks
    pub webhook_base_url: String,
    /// Model catalog
    pub models: Vec<ModelSpec>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            workers: WorkersConfig::default(),
            routing: RoutingConfig::default(),
            webhook_base_url: "http://localhost:8080".to_string(),
            models: default_models(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Worker loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of worker tasks
    pub count: usize,
    /// Blocking-pop timeout
    #[serde(with = "humantime_serde")]
    pub pop_timeout: Duration,
    /// Sleep before requeueing a job when all providers are saturated
    #[serde(with = "humantime_serde")]
    pub saturation_backoff: Duration,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 2,
            pop_timeout: Duration::from_secs(2),
            saturation_backoff: Duration::from_millis(500),
        }
    }
}

/// Chain filter settings; environment variables take precedence at runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Providers removed from every chain
    pub exclude_providers: Vec<String>,
    /// Keep only this provider's chain entries
    pub only_provider: Option<String>,
    /// Move this provider's entries to the front of every chain
    pub prefer_provider: Option<String>,
}

/// The starter catalog shipped with the service.
fn default_models() -> Vec<ModelSpec> {
    let hop = |provider: &str, model: &str| ProviderModelRef {
        provider: provider.to_string(),
        model: model.to_string(),
    };

    vec![
        ModelSpec::new(
            "flux-dev",
            MediaKind::Image,
            vec![
                hop("fal", "fal-ai/flux/dev"),
                hop("replicate", "black-forest-labs/flux-dev"),
                hop("fireworks", "flux-1-dev-fp8"),
            ],
        ),
        ModelSpec::new(
            "sdxl",
            MediaKind::Image,
            vec![
                hop("fireworks", "stable-diffusion-xl-1024-v1-0"),
                hop("replicate", "stability-ai/sdxl"),
                hop("runpod", "sdxl-endpoint"),
            ],
        ),
        ModelSpec::new(
            "svd-video",
            MediaKind::Video,
            vec![
                hop("replicate", "stability-ai/stable-video-diffusion"),
                hop("runpod", "svd-endpoint"),
            ],
        ),
    ]
}

/// Load configuration from disk with environment overrides.
///
/// # Errors
/// Returns error when an existing file cannot be read or parsed. A missing
/// file is not an error; the defaults are used.
pub async fn load_config() -> Result<ForgeConfig, ConfigError> {
    let path = std::env::var("FORGE_CONFIG").unwrap_or_else(|_| "forge.yaml".to_string());

    let mut config = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => {
            let config: ForgeConfig =
                serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            info!(path = %path, models = config.models.len(), "configuration loaded");
            config
        }
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path, "config file not found, using defaults");
            ForgeConfig::default()
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut ForgeConfig) {
    if let Ok(host) = std::env::var("FORGE_HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("FORGE_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(value = %port, "ignoring invalid FORGE_PORT"),
        }
    }
    if let Ok(count) = std::env::var("FORGE_WORKERS") {
        match count.parse() {
            Ok(count) => config.workers.count = count,
            Err(_) => warn!(value = %count, "ignoring invalid FORGE_WORKERS"),
        }
    }
    if let Ok(base) = std::env::var("FORGE_WEBHOOK_BASE_URL") {
        config.webhook_base_url = base;
    }
}
