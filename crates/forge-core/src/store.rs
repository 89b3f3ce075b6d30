//! Storage traits for job records and generated artifacts.
//!
//! The real backing stores are external collaborators; these traits model
//! the narrow surface the routing subsystem needs (single-row get/insert/
//! update, no multi-row transactions). The in-memory backends serve tests
//! and single-instance deployments.

use crate::error::{ForgeError, ForgeResult};
use crate::job::{Job, JobPatch};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

/// CRUD surface over the job record store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job by id
    async fn get(&self, job_id: &str) -> ForgeResult<Option<Job>>;

    /// Insert a new job record
    async fn insert(&self, job: Job) -> ForgeResult<()>;

    /// Apply a partial update to a job record (single-row atomic)
    async fn update(&self, job_id: &str, patch: JobPatch) -> ForgeResult<()>;

    /// Find the job assigned to a provider-side handle
    async fn find_by_handle(&self, provider: &str, handle: &str) -> ForgeResult<Option<Job>>;
}

/// Durable storage for generated artifacts.
///
/// The synchronous provider receives inline binary payloads; they are
/// persisted here before the job record is finalized, since jobs only carry
/// references.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a blob under `key` and return its durable URL
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> ForgeResult<String>;
}

/// In-memory job store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: DashMap<String, Job>,
}

impl MemoryJobStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, job_id: &str) -> ForgeResult<Option<Job>> {
        Ok(self.jobs.get(job_id).map(|j| j.clone()))
    }

    async fn insert(&self, job: Job) -> ForgeResult<()> {
        if self.jobs.contains_key(&job.id) {
            return Err(ForgeError::store(format!("job {} already exists", job.id)));
        }
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn update(&self, job_id: &str, patch: JobPatch) -> ForgeResult<()> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ForgeError::store(format!("job {job_id} not found")))?;

        let job = entry.value_mut();
        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(provider) = patch.provider {
            job.provider = Some(provider);
        }
        if let Some(handle) = patch.provider_handle {
            job.provider_handle = Some(handle);
        }
        if let Some(count) = patch.retry_count {
            job.retry_count = count;
        }
        if let Some(error) = patch.error {
            job.error = Some(error);
        }
        if let Some(outputs) = patch.outputs {
            job.outputs = outputs;
        }
        if let Some(at) = patch.completed_at {
            job.completed_at = Some(at);
        }
        Ok(())
    }

    async fn find_by_handle(&self, provider: &str, handle: &str) -> ForgeResult<Option<Job>> {
        Ok(self
            .jobs
            .iter()
            .find(|j| {
                j.provider.as_deref() == Some(provider)
                    && j.provider_handle.as_deref() == Some(handle)
            })
            .map(|j| j.clone()))
    }
}

/// In-memory artifact store returning URLs under a configurable base.
#[derive(Debug)]
pub struct MemoryArtifactStore {
    base_url: String,
    objects: DashMap<String, (String, Bytes)>,
}

impl MemoryArtifactStore {
    /// Create a store serving URLs under `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: DashMap::new(),
        }
    }

    /// Fetch a stored blob (tests and local serving)
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|o| o.1.clone())
    }

    /// Number of stored artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new("https://artifacts.local")
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> ForgeResult<String> {
        self.objects
            .insert(key.to_string(), (content_type.to_string(), data));
        Ok(format!("{}/{}", self.base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::GenerationInput;
    use crate::job::JobStatus;

    fn sample_job() -> Job {
        Job::new("flux-dev", GenerationInput::new(), "user-1")
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryJobStore::new();
        let job = sample_job();
        let id = job.id.clone();

        store.insert(job).await.expect("insert");
        let fetched = store.get(&id).await.expect("get").expect("exists");
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, JobStatus::Queued);

        assert!(store.get("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let store = MemoryJobStore::new();
        let job = sample_job();
        store.insert(job.clone()).await.expect("insert");
        assert!(store.insert(job).await.is_err());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let store = MemoryJobStore::new();
        let job = sample_job();
        let id = job.id.clone();
        store.insert(job).await.expect("insert");

        store
            .update(
                &id,
                JobPatch::new()
                    .status(JobStatus::Processing)
                    .provider("replicate")
                    .provider_handle("pred-123"),
            )
            .await
            .expect("update");

        let job = store.get(&id).await.expect("get").expect("exists");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.provider.as_deref(), Some("replicate"));
        assert_eq!(job.provider_handle.as_deref(), Some("pred-123"));
        // Untouched fields survive
        assert_eq!(job.retry_count, 0);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_find_by_handle() {
        let store = MemoryJobStore::new();
        let job = sample_job();
        let id = job.id.clone();
        store.insert(job).await.expect("insert");
        store
            .update(
                &id,
                JobPatch::new().provider("fal").provider_handle("req-9"),
            )
            .await
            .expect("update");

        let found = store
            .find_by_handle("fal", "req-9")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.id, id);

        assert!(store
            .find_by_handle("replicate", "req-9")
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn test_artifact_store_put() {
        let store = MemoryArtifactStore::new("https://cdn.test/");
        let url = store
            .put("job-1/0.png", "image/png", Bytes::from_static(b"fake"))
            .await
            .expect("put");

        assert_eq!(url, "https://cdn.test/job-1/0.png");
        assert_eq!(store.get("job-1/0.png"), Some(Bytes::from_static(b"fake")));
    }
}
