//! The fallback orchestrator.
//!
//! Attempts the resolved provider chain in order, abandoning the chain at
//! the first success and aggregating every failure when no provider
//! succeeds. Retry across providers lives here and only here; adapters
//! never retry internally.

use crate::chain::{resolve_chain, ChainEntry, ChainFilters};
use crate::dispatcher::Dispatcher;
use forge_core::{ChainAttempt, ForgeError, ForgeResult, Job, ModelCatalog, SubmitOutcome};
use forge_providers::ProviderRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// A successful generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Provider that served the job
    pub provider: String,
    /// Position of that provider in the resolved chain
    pub chain_index: usize,
    /// What the provider returned
    pub outcome: SubmitOutcome,
}

/// Tries providers in chain order, advancing past failures.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    catalog: Arc<ModelCatalog>,
    dispatcher: Arc<Dispatcher>,
    filters: ChainFilters,
}

impl Orchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        catalog: Arc<ModelCatalog>,
        dispatcher: Arc<Dispatcher>,
        filters: ChainFilters,
    ) -> Self {
        Self {
            registry,
            catalog,
            dispatcher,
            filters,
        }
    }

    /// Resolve the filtered chain for a model.
    ///
    /// # Errors
    /// Configuration error for an unknown model or an empty chain.
    pub fn resolve(&self, model_id: &str) -> ForgeResult<Vec<ChainEntry>> {
        let spec = self
            .catalog
            .get(model_id)
            .ok_or_else(|| ForgeError::configuration(format!("unknown model {model_id}")))?;
        resolve_chain(spec, &self.filters)
    }

    /// Attempt the chain from `start_index` and return the first success.
    ///
    /// `start_index` lets a webhook-triggered retry resume the chain after
    /// the provider that already failed instead of re-trying it.
    ///
    /// # Errors
    /// `ChainExhausted` when every entry from `start_index` onward failed.
    /// Terminal for the job, since every option was already tried.
    pub async fn generate(&self, job: &Job, start_index: usize) -> ForgeResult<GenerationResult> {
        let chain = self.resolve(&job.model_id)?;
        let mut attempts: Vec<ChainAttempt> = Vec::new();

        for (index, entry) in chain.iter().enumerate().skip(start_index) {
            let next = chain
                .get(index + 1)
                .map_or("none (chain exhausted)", |e| e.provider.as_str());

            let Some(provider) = self.registry.get(&entry.provider) else {
                warn!(
                    job_id = %job.id,
                    provider = %entry.provider,
                    position = index,
                    next_provider = %next,
                    "provider not registered, advancing"
                );
                attempts.push(ChainAttempt {
                    provider: entry.provider.clone(),
                    message: "provider not registered".to_string(),
                });
                continue;
            };

            let payload = match provider.map_input(&job.input, &entry.model) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(
                        job_id = %job.id,
                        provider = %entry.provider,
                        position = index,
                        next_provider = %next,
                        error = %e,
                        "input mapping failed, advancing"
                    );
                    attempts.push(ChainAttempt {
                        provider: entry.provider.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            self.dispatcher.report_submit(&entry.provider).await;
            match provider.submit(job, &entry.model, &payload).await {
                Ok(outcome) => {
                    info!(
                        job_id = %job.id,
                        provider = %entry.provider,
                        position = index,
                        "provider accepted job"
                    );
                    return Ok(GenerationResult {
                        provider: entry.provider.clone(),
                        chain_index: index,
                        outcome,
                    });
                }
                Err(e) => {
                    self.dispatcher.report_error(&entry.provider).await;
                    warn!(
                        job_id = %job.id,
                        provider = %entry.provider,
                        position = index,
                        next_provider = %next,
                        error = %e,
                        "provider submission failed, advancing"
                    );
                    attempts.push(ChainAttempt {
                        provider: entry.provider.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(ForgeError::chain_exhausted(attempts))
    }
}
