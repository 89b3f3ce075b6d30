//! # Forge Queue
//!
//! Durable job intake and the worker loop for MediaForge.
//!
//! The queue is a blocking FIFO list (push to tail, pop with timeout);
//! the real transport is an external collaborator and the in-memory backend
//! mirrors its semantics for tests and single instances. Workers are safe
//! to run as N parallel instances: all cross-worker coordination goes
//! through the shared provider runtime state, never in-process memory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod queue;
pub mod worker;

// Re-export main types
pub use queue::{MemoryWorkQueue, WorkQueue};
pub use worker::{Worker, WorkerConfig};
