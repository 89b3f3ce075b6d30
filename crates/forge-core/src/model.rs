//! Model catalog and provider-chain configuration.

use crate::error::{ForgeError, ForgeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of media a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still images
    Image,
    /// Video clips
    Video,
}

/// One hop in a model's fallback chain: which provider, and what the model
/// is called there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModelRef {
    /// Provider name
    pub provider: String,
    /// Provider-specific model string
    pub model: String,
}

/// Static configuration for one catalog model.
///
/// Either `providers` carries the explicit ordered chain, or the legacy
/// `provider`/`fallback_provider` fields describe a one- or two-hop chain.
/// The explicit list takes precedence when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Catalog model identifier
    pub id: String,
    /// Kind of media this model produces
    pub kind: MediaKind,
    /// Explicit ordered provider chain
    #[serde(default)]
    pub providers: Vec<ProviderModelRef>,
    /// Legacy: primary provider name
    #[serde(default)]
    pub provider: Option<String>,
    /// Legacy: primary provider model string
    #[serde(default)]
    pub provider_model: Option<String>,
    /// Legacy: fallback provider name
    #[serde(default)]
    pub fallback_provider: Option<String>,
    /// Legacy: fallback provider model string
    #[serde(default)]
    pub fallback_model: Option<String>,
}

impl ModelSpec {
    /// Create a spec with an explicit provider chain
    #[must_use]
    pub fn new(id: impl Into<String>, kind: MediaKind, providers: Vec<ProviderModelRef>) -> Self {
        Self {
            id: id.into(),
            kind,
            providers,
            provider: None,
            provider_model: None,
            fallback_provider: None,
            fallback_model: None,
        }
    }

    /// The base ordered chain before any filtering.
    ///
    /// # Errors
    /// Returns a configuration error when neither the explicit list nor the
    /// legacy fields describe at least one hop.
    pub fn base_chain(&self) -> ForgeResult<Vec<ProviderModelRef>> {
        if !self.providers.is_empty() {
            return Ok(self.providers.clone());
        }

        let mut chain = Vec::new();
        if let Some(provider) = &self.provider {
            chain.push(ProviderModelRef {
                provider: provider.clone(),
                model: self
                    .provider_model
                    .clone()
                    .unwrap_or_else(|| self.id.clone()),
            });
        }
        if let Some(fallback) = &self.fallback_provider {
            chain.push(ProviderModelRef {
                provider: fallback.clone(),
                model: self
                    .fallback_model
                    .clone()
                    .unwrap_or_else(|| self.id.clone()),
            });
        }

        if chain.is_empty() {
            return Err(ForgeError::configuration(format!(
                "model {} has no provider chain configured",
                self.id
            )));
        }
        Ok(chain)
    }
}

/// Lookup table of configured models.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, ModelSpec>,
}

impl ModelCatalog {
    /// Build a catalog from a list of specs; later duplicates win.
    #[must_use]
    pub fn new(specs: Vec<ModelSpec>) -> Self {
        let models = specs.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self { models }
    }

    /// Look up a model by id
    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<&ModelSpec> {
        self.models.get(model_id)
    }

    /// Number of configured models
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Ids of all configured models
    #[must_use]
    pub fn model_ids(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}
