//! HTTP request handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use forge_core::{GenerationInput, Job, QueueJob};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::error::ApiError;
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.registry.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no providers available")
    } else if state.catalog.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no models configured")
    } else {
        (StatusCode::OK, "ready")
    }
}

/// Liveness check endpoint
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

/// Job submission request
#[derive(Debug, Deserialize)]
pub struct CreateGenerationRequest {
    /// Catalog model id
    pub model: String,
    /// Generic generation parameters
    pub input: GenerationInput,
    /// Owning user
    pub user_id: String,
}

/// Job submission acknowledgment
#[derive(Debug, Serialize)]
pub struct CreateGenerationResponse {
    /// Assigned job id
    pub id: String,
    /// Initial status
    pub status: String,
}

/// Enqueue a generation job.
#[instrument(skip(state, body), fields(model = %body.model))]
pub async fn create_generation(
    State(state): State<AppState>,
    Json(body): Json<CreateGenerationRequest>,
) -> Result<(StatusCode, Json<CreateGenerationResponse>), ApiError> {
    if state.catalog.get(&body.model).is_none() {
        return Err(ApiError::bad_request(format!(
            "unknown model: {}",
            body.model
        )));
    }

    let job = Job::new(body.model, body.input, body.user_id);
    let envelope = serde_json::to_string(&QueueJob::for_job(&job))
        .map_err(|e| ApiError::internal(format!("failed to serialize job: {e}")))?;

    debug!(job_id = %job.id, model = %job.model_id, "enqueueing job");

    let id = job.id.clone();
    state.store.insert(job).await?;
    state.queue.push(envelope).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateGenerationResponse {
            id,
            status: "queued".to_string(),
        }),
    ))
}

/// Fetch a job record.
#[instrument(skip(state))]
pub async fn get_generation(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .store
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job not found: {job_id}")))?;
    Ok(Json(job))
}

/// Provider webhook endpoint.
///
/// Parses the provider-native body via the adapter, acks immediately, and
/// runs the completion pipeline in the background. Providers expect a fast
/// response, not our side effects.
#[instrument(skip(state, body))]
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let adapter = state
        .registry
        .get(&provider)
        .ok_or_else(|| ApiError::not_found(format!("unknown provider: {provider}")))?;

    let result = adapter
        .parse_webhook(&body)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    debug!(
        provider = %provider,
        handle = %result.handle,
        status = ?result.status,
        "webhook received"
    );

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.handle(&provider, result).await {
            error!(provider = %provider, error = %e, "completion pipeline failed");
        }
    });

    Ok((StatusCode::OK, "ok"))
}
