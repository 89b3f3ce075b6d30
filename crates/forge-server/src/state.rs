//! Shared application state.

use forge_core::{JobStore, ModelCatalog};
use forge_providers::ProviderRegistry;
use forge_queue::WorkQueue;
use forge_webhooks::CompletionPipeline;
use std::sync::Arc;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Job record store
    pub store: Arc<dyn JobStore>,
    /// Durable work queue
    pub queue: Arc<dyn WorkQueue>,
    /// Registered provider adapters
    pub registry: Arc<ProviderRegistry>,
    /// Model catalog
    pub catalog: Arc<ModelCatalog>,
    /// Webhook completion pipeline
    pub pipeline: Arc<CompletionPipeline>,
}

impl AppState {
    /// Create the application state
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        registry: Arc<ProviderRegistry>,
        catalog: Arc<ModelCatalog>,
        pipeline: Arc<CompletionPipeline>,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            catalog,
            pipeline,
        }
    }
}
