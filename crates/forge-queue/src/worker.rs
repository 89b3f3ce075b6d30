//! The worker loop.
//!
//! Pops envelopes, asks the dispatcher for an eligible provider, and runs
//! the orchestrator. Each job is popped by exactly one worker instance, but
//! N workers may run in parallel against the same queue because all shared
//! mutable state lives behind the dispatcher's atomic counters.

use crate::queue::WorkQueue;
use chrono::Utc;
use forge_core::{
    ForgeError, ForgeResult, Job, JobPatch, JobStatus, JobStore, QueueJob, SubmitOutcome,
};
use forge_dispatch::{Dispatcher, Orchestrator};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Worker loop configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Blocking-pop timeout; bounds how long a stop request can go unseen
    pub pop_timeout: Duration,
    /// Sleep before re-pushing a job when every provider is saturated
    pub saturation_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pop_timeout: Duration::from_secs(2),
            saturation_backoff: Duration::from_millis(500),
        }
    }
}

/// One worker instance.
pub struct Worker {
    id: usize,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    orchestrator: Arc<Orchestrator>,
    config: WorkerConfig,
    stop: Arc<AtomicBool>,
}

impl Worker {
    /// Create a worker
    #[must_use]
    pub fn new(
        id: usize,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        orchestrator: Arc<Orchestrator>,
        config: WorkerConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            queue,
            store,
            dispatcher,
            orchestrator,
            config,
            stop,
        }
    }

    /// Run until the stop flag is set.
    pub async fn run(self) {
        info!(worker = self.id, "worker started");

        while !self.stop.load(Ordering::SeqCst) {
            let payload = match self.queue.pop(self.config.pop_timeout).await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    error!(worker = self.id, error = %e, "queue pop failed");
                    tokio::time::sleep(self.config.pop_timeout).await;
                    continue;
                }
            };

            self.process(payload).await;
        }

        info!(worker = self.id, "worker stopped");
    }

    /// Handle one popped envelope.
    pub async fn process(&self, payload: String) {
        // Malformed envelopes can never succeed; log and drop.
        let envelope: QueueJob = match serde_json::from_str(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(worker = self.id, error = %e, "malformed queue payload dropped");
                return;
            }
        };

        let chain = match self.orchestrator.resolve(&envelope.model_id) {
            Ok(chain) => chain,
            Err(e) => {
                // Unknown model / empty chain: terminal, no provider to blame
                warn!(
                    worker = self.id,
                    job_id = %envelope.job_id,
                    model = %envelope.model_id,
                    error = %e,
                    "job failed before dispatch"
                );
                self.finalize_failed(&envelope.job_id, e.to_string()).await;
                return;
            }
        };

        let Some(picked) = self.dispatcher.pick(&chain).await else {
            // Backpressure valve: every provider is momentarily saturated.
            // Give other queued jobs a turn, then put this one back at the
            // tail untouched.
            let jitter = rand::thread_rng()
                .gen_range(0..=self.config.saturation_backoff.as_millis() as u64 / 2);
            debug!(
                worker = self.id,
                job_id = %envelope.job_id,
                "no eligible provider, requeueing"
            );
            tokio::time::sleep(self.config.saturation_backoff + Duration::from_millis(jitter))
                .await;
            if let Err(e) = self.queue.push(payload).await {
                error!(worker = self.id, job_id = %envelope.job_id, error = %e, "requeue failed");
            }
            return;
        };

        let job = match self.load_job(&envelope.job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(worker = self.id, job_id = %envelope.job_id, error = %e, "job record unavailable, dropping");
                return;
            }
        };
        if job.is_terminal() {
            debug!(worker = self.id, job_id = %job.id, "job already terminal, dropping");
            return;
        }

        match self.orchestrator.generate(&job, picked.index).await {
            Ok(result) => match result.outcome {
                SubmitOutcome::Completed { outputs, elapsed } => {
                    self.dispatcher.report_success(&result.provider).await;
                    info!(
                        worker = self.id,
                        job_id = %job.id,
                        provider = %result.provider,
                        outputs = outputs.len(),
                        elapsed_ms = elapsed.as_millis(),
                        "job completed synchronously"
                    );
                    self.apply_patch(
                        &job.id,
                        JobPatch::new()
                            .status(JobStatus::Completed)
                            .provider(&result.provider)
                            .outputs(outputs)
                            .completed_at(Utc::now()),
                    )
                    .await;
                }
                SubmitOutcome::Accepted { handle } => {
                    info!(
                        worker = self.id,
                        job_id = %job.id,
                        provider = %result.provider,
                        handle = %handle,
                        "job accepted, awaiting webhook"
                    );
                    // Dispatcher bookkeeping stays open until the webhook
                    // resolves the outcome.
                    self.apply_patch(
                        &job.id,
                        JobPatch::new()
                            .status(JobStatus::Processing)
                            .provider(&result.provider)
                            .provider_handle(handle),
                    )
                    .await;
                }
            },
            Err(e) => {
                // Chain exhausted (or config changed underneath us):
                // terminal failure, every option was already tried.
                warn!(worker = self.id, job_id = %job.id, error = %e, "generation failed");
                self.finalize_failed(&job.id, e.to_string()).await;
            }
        }
    }

    async fn load_job(&self, job_id: &str) -> ForgeResult<Job> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| ForgeError::store(format!("job {job_id} not found")))
    }

    async fn finalize_failed(&self, job_id: &str, error: String) {
        self.apply_patch(
            job_id,
            JobPatch::new()
                .status(JobStatus::Failed)
                .error(error)
                .completed_at(Utc::now()),
        )
        .await;
    }

    async fn apply_patch(&self, job_id: &str, patch: JobPatch) {
        if let Err(e) = self.store.update(job_id, patch).await {
            error!(worker = self.id, job_id = %job_id, error = %e, "job update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryWorkQueue;
    use async_trait::async_trait;
    use forge_core::{
        ForgeResult, GenerationInput, GenerationProvider, MediaKind, MemoryJobStore,
        ModelCatalog, ModelSpec, ProviderModelRef, WebhookResult,
    };
    use forge_dispatch::{ChainFilters, LimitsTable, MemoryStateStore, ProviderLimits};
    use forge_providers::ProviderRegistry;

    enum Behavior {
        SyncOk,
        AsyncOk,
        Fail,
    }

    struct TestProvider {
        name: &'static str,
        behavior: Behavior,
    }

    #[async_trait]
    impl GenerationProvider for TestProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn map_input(
            &self,
            _input: &GenerationInput,
            _provider_model: &str,
        ) -> ForgeResult<serde_json::Value> {
            Ok(serde_json::json!({}))
        }

        async fn submit(
            &self,
            job: &Job,
            _provider_model: &str,
            _payload: &serde_json::Value,
        ) -> ForgeResult<SubmitOutcome> {
            match self.behavior {
                Behavior::SyncOk => Ok(SubmitOutcome::Completed {
                    outputs: vec![format!("https://cdn.test/{}.png", job.id)],
                    elapsed: Duration::from_millis(3),
                }),
                Behavior::AsyncOk => Ok(SubmitOutcome::Accepted {
                    handle: format!("{}-handle", self.name),
                }),
                Behavior::Fail => Err(ForgeError::provider(
                    self.name,
                    "boom",
                    Some(500),
                    true,
                )),
            }
        }

        fn webhook_url(&self) -> Option<String> {
            None
        }

        fn parse_webhook(&self, _raw: &serde_json::Value) -> ForgeResult<WebhookResult> {
            Err(ForgeError::internal("unused"))
        }
    }

    struct Harness {
        queue: Arc<MemoryWorkQueue>,
        store: Arc<MemoryJobStore>,
        dispatcher: Arc<Dispatcher>,
        worker: Worker,
        stop: Arc<AtomicBool>,
    }

    fn harness(providers: Vec<TestProvider>, limits: LimitsTable) -> Harness {
        let registry = Arc::new(ProviderRegistry::new());
        let chain: Vec<ProviderModelRef> = providers
            .iter()
            .map(|p| ProviderModelRef {
                provider: p.name.to_string(),
                model: format!("{}-model", p.name),
            })
            .collect();
        for provider in providers {
            registry.register(Arc::new(provider)).expect("register");
        }

        let catalog = Arc::new(ModelCatalog::new(vec![ModelSpec::new(
            "test-model",
            MediaKind::Image,
            chain,
        )]));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(MemoryStateStore::new()), limits));
        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            catalog,
            Arc::clone(&dispatcher),
            ChainFilters::none(),
        ));

        let queue = Arc::new(MemoryWorkQueue::new());
        let store = Arc::new(MemoryJobStore::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker = Worker::new(
            0,
            Arc::clone(&queue) as Arc<dyn WorkQueue>,
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::clone(&dispatcher),
            orchestrator,
            WorkerConfig {
                pop_timeout: Duration::from_millis(20),
                saturation_backoff: Duration::from_millis(10),
            },
            Arc::clone(&stop),
        );

        Harness {
            queue,
            store,
            dispatcher,
            worker,
            stop,
        }
    }

    async fn enqueue_job(harness: &Harness) -> Job {
        let job = Job::new("test-model", GenerationInput::new(), "user-1");
        harness.store.insert(job.clone()).await.expect("insert");
        let payload = serde_json::to_string(&QueueJob::for_job(&job)).expect("serialize");
        harness.queue.push(payload).await.expect("push");
        job
    }

    #[tokio::test]
    async fn test_sync_completion() {
        let harness = harness(
            vec![TestProvider {
                name: "fireworks",
                behavior: Behavior::SyncOk,
            }],
            LimitsTable::new(),
        );
        let job = enqueue_job(&harness).await;

        let payload = harness
            .queue
            .pop(Duration::from_millis(50))
            .await
            .expect("pop")
            .expect("payload");
        harness.worker.process(payload).await;

        let job = harness
            .store
            .get(&job.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.provider.as_deref(), Some("fireworks"));
        assert_eq!(job.outputs.len(), 1);
        assert!(job.completed_at.is_some());
        // Success reported: active counter back to zero
        assert_eq!(harness.dispatcher.active_count("fireworks").await, 0);
    }

    #[tokio::test]
    async fn test_async_acceptance() {
        let harness = harness(
            vec![TestProvider {
                name: "replicate",
                behavior: Behavior::AsyncOk,
            }],
            LimitsTable::new(),
        );
        let job = enqueue_job(&harness).await;

        let payload = harness
            .queue
            .pop(Duration::from_millis(50))
            .await
            .expect("pop")
            .expect("payload");
        harness.worker.process(payload).await;

        let job = harness
            .store
            .get(&job.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.provider.as_deref(), Some("replicate"));
        assert_eq!(job.provider_handle.as_deref(), Some("replicate-handle"));
        // Bookkeeping left open for the webhook
        assert_eq!(harness.dispatcher.active_count("replicate").await, 1);
    }

    #[tokio::test]
    async fn test_saturation_requeues_unchanged() {
        let limits = LimitsTable::new().with_limits(
            "replicate",
            ProviderLimits::concurrency(1, Duration::from_secs(5)),
        );
        let harness = harness(
            vec![TestProvider {
                name: "replicate",
                behavior: Behavior::AsyncOk,
            }],
            limits,
        );
        // Saturate the only provider
        harness.dispatcher.report_submit("replicate").await;

        let job = enqueue_job(&harness).await;
        let payload = harness
            .queue
            .pop(Duration::from_millis(50))
            .await
            .expect("pop")
            .expect("payload");
        harness.worker.process(payload.clone()).await;

        // The envelope came back verbatim and the record was not touched
        let requeued = harness
            .queue
            .pop(Duration::from_millis(50))
            .await
            .expect("pop")
            .expect("payload");
        assert_eq!(requeued, payload);

        let job = harness
            .store
            .get(&job.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.provider.is_none());
    }

    #[tokio::test]
    async fn test_chain_exhausted_fails_job() {
        let harness = harness(
            vec![TestProvider {
                name: "fal",
                behavior: Behavior::Fail,
            }],
            LimitsTable::new(),
        );
        let job = enqueue_job(&harness).await;

        let payload = harness
            .queue
            .pop(Duration::from_millis(50))
            .await
            .expect("pop")
            .expect("payload");
        harness.worker.process(payload).await;

        let job = harness
            .store
            .get(&job.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap_or("").contains("fal"));
    }

    #[tokio::test]
    async fn test_unknown_model_fails_job() {
        let harness = harness(
            vec![TestProvider {
                name: "fal",
                behavior: Behavior::SyncOk,
            }],
            LimitsTable::new(),
        );

        let mut job = Job::new("missing-model", GenerationInput::new(), "user-1");
        job.model_id = "missing-model".to_string();
        harness.store.insert(job.clone()).await.expect("insert");
        let payload = serde_json::to_string(&QueueJob::for_job(&job)).expect("serialize");

        harness.worker.process(payload).await;

        let job = harness
            .store
            .get(&job.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_malformed_payload_dropped() {
        let harness = harness(
            vec![TestProvider {
                name: "fal",
                behavior: Behavior::SyncOk,
            }],
            LimitsTable::new(),
        );

        // Must not panic and must not requeue
        harness.worker.process("{not json".to_string()).await;
        assert!(harness.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_flag() {
        let harness = harness(
            vec![TestProvider {
                name: "fal",
                behavior: Behavior::SyncOk,
            }],
            LimitsTable::new(),
        );
        let stop = Arc::clone(&harness.stop);

        let handle = tokio::spawn(harness.worker.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop.store(true, Ordering::SeqCst);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop must exit")
            .expect("join");
    }
}
