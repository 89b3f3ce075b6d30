//! # Forge Providers
//!
//! Compute provider adapters for MediaForge.
//!
//! One adapter per external backend:
//! - Fireworks (synchronous image API, inline payloads)
//! - Replicate (asynchronous predictions, webhook completion)
//! - Fal (asynchronous queue, webhook completion)
//! - RunPod (asynchronous serverless endpoints, webhook completion)
//!
//! Adapters map the generic input shape into their native request formats,
//! submit work, and normalize webhook callbacks. They never retry and never
//! decide fallback; that is the orchestrator's job.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fal;
pub mod fireworks;
pub mod registry;
pub mod replicate;
pub mod runpod;

// Re-export main types
pub use fal::{FalConfig, FalProvider};
pub use fireworks::{FireworksConfig, FireworksProvider};
pub use registry::ProviderRegistry;
pub use replicate::{ReplicateConfig, ReplicateProvider};
pub use runpod::{RunpodConfig, RunpodProvider};
