//! The webhook completion pipeline.
//!
//! Resolves asynchronous outcomes delivered out-of-band: looks up the job
//! by its provider handle, finalizes it idempotently, settles dispatcher
//! bookkeeping (the async active-counter decrement happens here, not at
//! submission), and drives bounded auto-retry and segment chaining.

use crate::classify::{classify_failure, FailureKind};
use crate::segment::next_segment;
use chrono::Utc;
use forge_core::{
    ForgeResult, Job, JobPatch, JobStatus, JobStore, QueueJob, SubmitOutcome, WebhookResult,
    WebhookStatus, MAX_AUTO_RETRIES,
};
use forge_dispatch::{Dispatcher, Orchestrator};
use forge_queue::WorkQueue;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the pipeline did with a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Job finalized with outputs
    Completed,
    /// Job finalized as failed
    Failed,
    /// Auto-retry resubmitted the job
    Retried {
        /// Provider now holding the job
        provider: String,
    },
    /// Job was already terminal; nothing changed
    AlreadyFinal,
    /// No job matches the handle; nothing changed
    UnknownHandle,
}

/// Finalizes jobs from normalized webhook results.
pub struct CompletionPipeline {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    dispatcher: Arc<Dispatcher>,
    orchestrator: Arc<Orchestrator>,
}

impl CompletionPipeline {
    /// Create a pipeline
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        dispatcher: Arc<Dispatcher>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            store,
            queue,
            dispatcher,
            orchestrator,
        }
    }

    /// Apply a normalized webhook result from `provider_name`.
    ///
    /// Safe to call twice with the same payload: a terminal job is left
    /// untouched.
    pub async fn handle(
        &self,
        provider_name: &str,
        result: WebhookResult,
    ) -> ForgeResult<CompletionOutcome> {
        let Some(job) = self
            .store
            .find_by_handle(provider_name, &result.handle)
            .await?
        else {
            warn!(
                provider = %provider_name,
                handle = %result.handle,
                "webhook for unknown handle ignored"
            );
            return Ok(CompletionOutcome::UnknownHandle);
        };

        if job.is_terminal() {
            debug!(
                job_id = %job.id,
                status = %job.status,
                "webhook for terminal job ignored"
            );
            return Ok(CompletionOutcome::AlreadyFinal);
        }

        match result.status {
            WebhookStatus::Completed => {
                self.dispatcher.report_success(provider_name).await;
                self.complete(&job, result.outputs).await
            }
            WebhookStatus::Failed => {
                self.dispatcher.report_error(provider_name).await;
                self.fail_or_retry(job, provider_name, &result).await
            }
        }
    }

    async fn complete(&self, job: &Job, outputs: Vec<String>) -> ForgeResult<CompletionOutcome> {
        if outputs.is_empty() {
            // Claimed success with nothing usable: finalize as failed
            warn!(job_id = %job.id, "completion webhook carried no valid outputs");
            self.finalize_failed(job, FailureKind::Unknown.friendly_message().to_string())
                .await?;
            return Ok(CompletionOutcome::Failed);
        }

        info!(
            job_id = %job.id,
            outputs = outputs.len(),
            "job completed via webhook"
        );
        self.store
            .update(
                &job.id,
                JobPatch::new()
                    .status(JobStatus::Completed)
                    .outputs(outputs.clone())
                    .completed_at(Utc::now()),
            )
            .await?;

        self.chain_segment(job, &outputs).await;
        Ok(CompletionOutcome::Completed)
    }

    async fn chain_segment(&self, job: &Job, outputs: &[String]) {
        let Some(follow_up) = next_segment(job, outputs) else {
            return;
        };

        info!(
            job_id = %job.id,
            next_job_id = %follow_up.id,
            segment = follow_up.input.segment_index(),
            "enqueueing next segment"
        );

        let envelope = match serde_json::to_string(&QueueJob::for_job(&follow_up)) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "failed to serialize segment envelope");
                return;
            }
        };
        if let Err(e) = self.store.insert(follow_up).await {
            warn!(job_id = %job.id, error = %e, "failed to insert segment job");
            return;
        }
        if let Err(e) = self.queue.push(envelope).await {
            warn!(job_id = %job.id, error = %e, "failed to enqueue segment job");
        }
    }

    async fn fail_or_retry(
        &self,
        job: Job,
        provider_name: &str,
        result: &WebhookResult,
    ) -> ForgeResult<CompletionOutcome> {
        let kind = classify_failure(result.error.as_deref(), result.logs.as_deref());

        if !kind.is_retryable() || job.retry_count >= MAX_AUTO_RETRIES {
            info!(
                job_id = %job.id,
                kind = ?kind,
                retry_count = job.retry_count,
                error = result.error.as_deref().unwrap_or(""),
                "job failed terminally"
            );
            self.finalize_failed(&job, failure_message(kind, job.retry_count))
                .await?;
            return Ok(CompletionOutcome::Failed);
        }

        // Retry resumes the chain after the provider that just failed
        let retry_count = job.retry_count + 1;
        let start_index = self.resume_index(&job, provider_name);
        info!(
            job_id = %job.id,
            kind = ?kind,
            retry = retry_count,
            max_retries = MAX_AUTO_RETRIES,
            start_index,
            "auto-retrying failed job"
        );

        // The counter is persisted before resubmission so the record stays
        // an accurate audit trail even if resubmission fails.
        self.store
            .update(&job.id, JobPatch::new().retry_count(retry_count))
            .await?;
        let mut retry_job = job;
        retry_job.retry_count = retry_count;

        match self.orchestrator.generate(&retry_job, start_index).await {
            Ok(generated) => match generated.outcome {
                SubmitOutcome::Accepted { handle } => {
                    self.store
                        .update(
                            &retry_job.id,
                            JobPatch::new()
                                .status(JobStatus::Processing)
                                .provider(&generated.provider)
                                .provider_handle(handle),
                        )
                        .await?;
                    Ok(CompletionOutcome::Retried {
                        provider: generated.provider,
                    })
                }
                SubmitOutcome::Completed { outputs, .. } => {
                    // A synchronous provider served the retry inline
                    self.dispatcher.report_success(&generated.provider).await;
                    self.store
                        .update(
                            &retry_job.id,
                            JobPatch::new().provider(&generated.provider),
                        )
                        .await?;
                    self.complete(&retry_job, outputs).await
                }
            },
            Err(e) => {
                warn!(job_id = %retry_job.id, error = %e, "auto-retry exhausted the chain");
                self.finalize_failed(&retry_job, failure_message(kind, retry_count))
                    .await?;
                Ok(CompletionOutcome::Failed)
            }
        }
    }

    /// Chain position to resume from: one past the failed provider, or the
    /// top when filters have since removed it from the chain.
    fn resume_index(&self, job: &Job, failed_provider: &str) -> usize {
        self.orchestrator
            .resolve(&job.model_id)
            .ok()
            .and_then(|chain| {
                chain
                    .iter()
                    .position(|entry| entry.provider == failed_provider)
            })
            .map_or(0, |position| position + 1)
    }

    async fn finalize_failed(&self, job: &Job, message: String) -> ForgeResult<()> {
        self.store
            .update(
                &job.id,
                JobPatch::new()
                    .status(JobStatus::Failed)
                    .error(message)
                    .completed_at(Utc::now()),
            )
            .await
    }
}

fn failure_message(kind: FailureKind, retry_count: u32) -> String {
    let base = kind.friendly_message();
    if retry_count > 0 {
        format!("{base} ({retry_count} automatic retries attempted)")
    } else {
        base.to_string()
    }
}
