//! # MediaForge
//!
//! Multi-provider routing service for AI image and video generation jobs.
//!
//! ## Features
//!
//! - Ordered provider fallback chains per model
//! - Per-provider concurrency, RPM, and escalating error cooldowns
//! - Durable work queue with parallel workers
//! - Webhook completion pipeline with bounded auto-retry and segment
//!   chaining
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! mediaforge
//!
//! # Start with custom config file
//! FORGE_CONFIG=/etc/mediaforge/forge.yaml mediaforge
//!
//! # Start with environment overrides
//! FORGE_PORT=9000 FORGE_WORKERS=4 mediaforge
//! ```

use forge_config::{load_config, ForgeConfig, RoutingConfig};
use forge_core::{
    JobStore, MemoryArtifactStore, MemoryJobStore, ModelCatalog,
};
use forge_dispatch::{ChainFilters, Dispatcher, LimitsTable, MemoryStateStore, Orchestrator};
use forge_providers::{
    FalConfig, FalProvider, FireworksConfig, FireworksProvider, ProviderRegistry,
    ReplicateConfig, ReplicateProvider, RunpodConfig, RunpodProvider,
};
use forge_queue::{MemoryWorkQueue, WorkQueue, Worker, WorkerConfig};
use forge_server::{serve, AppState};
use forge_telemetry::{init_logging, LoggingConfig};
use forge_webhooks::CompletionPipeline;
use std::env;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application entry point
#[tokio::main]
async fn main() {
    let json_logs = env::var("FORGE_LOG_JSON").is_ok();
    if let Err(e) = init_logging(&LoggingConfig::new().with_level("info").with_json(json_logs)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting MediaForge"
    );

    if let Err(e) = run().await {
        error!(error = %e, "Application failed");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config().await?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        workers = config.workers.count,
        models = config.models.len(),
        "Configuration loaded"
    );

    // External collaborators, modeled in-memory for a single instance
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryWorkQueue::new());
    let state_store = Arc::new(MemoryStateStore::new());
    let artifacts = Arc::new(MemoryArtifactStore::default());

    let registry = create_provider_registry(&config, artifacts)?;
    info!(providers = registry.len(), "Provider registry initialized");

    let catalog = Arc::new(ModelCatalog::new(config.models.clone()));
    let filters = chain_filters(&config.routing);
    let dispatcher = Arc::new(Dispatcher::new(state_store, LimitsTable::builtin()));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&registry),
        Arc::clone(&catalog),
        Arc::clone(&dispatcher),
        filters,
    ));
    let pipeline = Arc::new(CompletionPipeline::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::clone(&queue) as Arc<dyn WorkQueue>,
        Arc::clone(&dispatcher),
        Arc::clone(&orchestrator),
    ));

    // Worker pool
    let stop = Arc::new(AtomicBool::new(false));
    let worker_config = WorkerConfig {
        pop_timeout: config.workers.pop_timeout,
        saturation_backoff: config.workers.saturation_backoff,
    };
    let mut worker_handles = Vec::with_capacity(config.workers.count);
    for id in 0..config.workers.count {
        let worker = Worker::new(
            id,
            Arc::clone(&queue) as Arc<dyn WorkQueue>,
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::clone(&dispatcher),
            Arc::clone(&orchestrator),
            worker_config.clone(),
            Arc::clone(&stop),
        );
        worker_handles.push(tokio::spawn(worker.run()));
    }

    // HTTP server runs until a shutdown signal arrives
    let state = AppState::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::clone(&queue) as Arc<dyn WorkQueue>,
        registry,
        catalog,
        pipeline,
    );
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    serve(addr, state).await?;

    // Drain the workers
    info!("Stopping workers");
    stop.store(true, Ordering::SeqCst);
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Merge config-file filters with environment overrides
fn chain_filters(routing: &RoutingConfig) -> ChainFilters {
    let env = ChainFilters::from_env();
    ChainFilters {
        exclude: if env.exclude.is_empty() {
            routing.exclude_providers.clone()
        } else {
            env.exclude
        },
        only: env.only.or_else(|| routing.only_provider.clone()),
        prefer: env.prefer.or_else(|| routing.prefer_provider.clone()),
    }
}

/// Create the provider registry from environment credentials
fn create_provider_registry(
    config: &ForgeConfig,
    artifacts: Arc<MemoryArtifactStore>,
) -> Result<Arc<ProviderRegistry>, Box<dyn std::error::Error>> {
    let registry = ProviderRegistry::new();
    let webhook_base = config.webhook_base_url.as_str();

    if let Ok(api_key) = env::var("FIREWORKS_API_KEY") {
        info!("Registering Fireworks provider from environment");
        let provider = FireworksProvider::new(FireworksConfig::new(api_key), artifacts)?;
        registry.register(Arc::new(provider))?;
    } else {
        warn!("FIREWORKS_API_KEY not set, Fireworks provider not available");
    }

    if let Ok(api_token) = env::var("REPLICATE_API_TOKEN") {
        info!("Registering Replicate provider from environment");
        let provider = ReplicateProvider::new(ReplicateConfig::new(api_token, webhook_base))?;
        registry.register(Arc::new(provider))?;
    } else {
        warn!("REPLICATE_API_TOKEN not set, Replicate provider not available");
    }

    if let Ok(api_key) = env::var("FAL_KEY") {
        info!("Registering Fal provider from environment");
        let provider = FalProvider::new(FalConfig::new(api_key, webhook_base))?;
        registry.register(Arc::new(provider))?;
    } else {
        warn!("FAL_KEY not set, Fal provider not available");
    }

    if let Ok(api_key) = env::var("RUNPOD_API_KEY") {
        info!("Registering RunPod provider from environment");
        let provider = RunpodProvider::new(RunpodConfig::new(api_key, webhook_base))?;
        registry.register(Arc::new(provider))?;
    } else {
        warn!("RUNPOD_API_KEY not set, RunPod provider not available");
    }

    if registry.is_empty() {
        warn!("No provider credentials configured; jobs will fail until one is set");
    }

    Ok(Arc::new(registry))
}
