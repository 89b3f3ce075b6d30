//! # Forge Webhooks
//!
//! The completion pipeline for asynchronous providers:
//! - Failure classification (retryable vs. terminal) with user-facing
//!   messages
//! - Idempotent job finalization keyed by provider handle
//! - Bounded auto-retry that resumes the chain past the failed provider
//! - Segment chaining for long-form outputs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod pipeline;
pub mod segment;

// Re-export main types
pub use classify::{classify_failure, FailureKind};
pub use pipeline::{CompletionOutcome, CompletionPipeline};
pub use segment::next_segment;
