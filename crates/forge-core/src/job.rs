//! The generation job entity and its queue envelope.

use crate::input::GenerationInput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of automatic retries triggered by webhook failures.
///
/// Once a job's [`Job::retry_count`] reaches this bound it is finalized as
/// failed regardless of how the last error was classified.
pub const MAX_AUTO_RETRIES: u32 = 3;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and waiting on the work queue
    Queued,
    /// Accepted by a provider; completion pending
    Processing,
    /// Finished with outputs (terminal)
    Completed,
    /// Finished without outputs (terminal)
    Failed,
}

impl JobStatus {
    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A unit of generation work.
///
/// Written only by the worker loop and the webhook completion pipeline;
/// everything else reads it or passes it by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job id
    pub id: String,
    /// Target model identifier in the catalog
    pub model_id: String,
    /// Generic generation parameters
    pub input: GenerationInput,
    /// Owning user
    pub user_id: String,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Provider that accepted the job, once assigned
    pub provider: Option<String>,
    /// Provider-side prediction/request id, once assigned
    pub provider_handle: Option<String>,
    /// Automatic retries consumed so far (bounded by [`MAX_AUTO_RETRIES`])
    pub retry_count: u32,
    /// Last error message, if any
    pub error: Option<String>,
    /// Locators of the generated media
    pub outputs: Vec<String>,
    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job
    #[must_use]
    pub fn new(
        model_id: impl Into<String>,
        input: GenerationInput,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model_id: model_id.into(),
            input,
            user_id: user_id.into(),
            status: JobStatus::Queued,
            provider: None,
            provider_handle: None,
            retry_count: 0,
            error: None,
            outputs: Vec::new(),
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the job has reached a terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Partial update applied to a job record.
///
/// Only set fields are written; the store performs a single-row atomic
/// update with no cross-row guarantees.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    /// New status
    pub status: Option<JobStatus>,
    /// Assigned provider
    pub provider: Option<String>,
    /// Assigned provider-side handle
    pub provider_handle: Option<String>,
    /// New retry count
    pub retry_count: Option<u32>,
    /// Error message
    pub error: Option<String>,
    /// Output locators
    pub outputs: Option<Vec<String>>,
    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// Create an empty patch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status
    #[must_use]
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the assigned provider
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the provider-side handle
    #[must_use]
    pub fn provider_handle(mut self, handle: impl Into<String>) -> Self {
        self.provider_handle = Some(handle.into());
        self
    }

    /// Set the retry count
    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Set the error message
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set the output locators
    #[must_use]
    pub fn outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Set the completion timestamp
    #[must_use]
    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

/// Serialized envelope pushed onto the durable work queue.
///
/// Consumed and discarded once popped; re-pushed verbatim when no provider
/// is currently eligible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    /// Job id in the record store
    pub job_id: String,
    /// Target model identifier
    pub model_id: String,
    /// Generic generation parameters
    pub input: GenerationInput,
    /// Owning user
    pub user_id: String,
}

impl QueueJob {
    /// Build the envelope for a job
    #[must_use]
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            model_id: job.model_id.clone(),
            input: job.input.clone(),
            user_id: job.user_id.clone(),
        }
    }
}
