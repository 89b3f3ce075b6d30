//! Provider registry.

use forge_core::{ForgeError, ForgeResult, GenerationProvider};
use dashmap::DashMap;
use std::sync::Arc;

/// Name-keyed registry of provider adapters.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider adapter.
    ///
    /// # Errors
    /// Returns a configuration error if the name is already registered.
    pub fn register(&self, provider: Arc<dyn GenerationProvider>) -> ForgeResult<()> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(ForgeError::configuration(format!(
                "provider {name} already registered"
            )));
        }
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Look up an adapter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(name).map(|p| Arc::clone(&p))
    }

    /// Names of all registered providers
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.key().clone()).collect()
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
