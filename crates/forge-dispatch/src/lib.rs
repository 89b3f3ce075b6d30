//! # Forge Dispatch
//!
//! Provider scheduling for MediaForge:
//! - Chain resolution with exclusion/inclusion/promotion filters
//! - Per-provider concurrency, RPM, and cooldown enforcement
//! - Shared runtime counters behind atomic primitives
//! - Ordered fallback orchestration across the resolved chain

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chain;
pub mod dispatcher;
pub mod limits;
pub mod orchestrator;
pub mod state;

// Re-export main types
pub use chain::{resolve_chain, ChainEntry, ChainFilters};
pub use dispatcher::{Dispatcher, Picked};
pub use limits::{LimitsTable, ProviderLimits, COOLDOWN_MULTIPLIERS};
pub use orchestrator::{GenerationResult, Orchestrator};
pub use state::{MemoryStateStore, RuntimeStateStore};
