//! # Forge Core
//!
//! Core types, traits, and error handling for MediaForge.
//!
//! This crate provides the foundational types used throughout the service:
//! - The [`Job`] entity and its lifecycle
//! - The [`GenerationProvider`] adapter trait and webhook currency
//! - Model catalog and provider-chain configuration
//! - Storage traits for job records and generated artifacts
//! - Error types and handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod input;
pub mod job;
pub mod model;
pub mod provider;
pub mod store;

// Re-export commonly used types
pub use error::{ChainAttempt, ForgeError, ForgeResult};
pub use input::GenerationInput;
pub use job::{Job, JobPatch, JobStatus, QueueJob, MAX_AUTO_RETRIES};
pub use model::{MediaKind, ModelCatalog, ModelSpec, ProviderModelRef};
pub use provider::{
    filter_media_urls, is_plausible_media_url, GenerationProvider, SubmitOutcome, WebhookResult,
    WebhookStatus,
};
pub use store::{ArtifactStore, JobStore, MemoryArtifactStore, MemoryJobStore};
