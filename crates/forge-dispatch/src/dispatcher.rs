//! The rate-limited dispatcher.
//!
//! Decides, at the moment a job is ready, which chain entry (if any) may
//! receive work right now, without blocking. Live counters are kept in the
//! shared [`RuntimeStateStore`] so any number of worker processes can
//! coordinate through it.

use crate::chain::ChainEntry;
use crate::limits::{LimitsTable, ProviderLimits};
use crate::state::RuntimeStateStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Rolling request-count window for RPM enforcement.
const RPM_WINDOW: Duration = Duration::from_secs(60);

/// Expiry on the consecutive-error counter, so an isolated old error does
/// not permanently inflate cooldown math.
const ERROR_WINDOW: Duration = Duration::from_secs(600);

/// An eligible chain entry chosen by [`Dispatcher::pick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picked {
    /// The chain entry
    pub entry: ChainEntry,
    /// Its position in the chain
    pub index: usize,
}

/// Tracks live per-provider counters and picks eligible providers.
pub struct Dispatcher {
    state: Arc<dyn RuntimeStateStore>,
    limits: LimitsTable,
}

impl Dispatcher {
    /// Create a dispatcher over a shared state store
    #[must_use]
    pub fn new(state: Arc<dyn RuntimeStateStore>, limits: LimitsTable) -> Self {
        Self { state, limits }
    }

    /// First chain entry currently eligible to receive work, or `None` when
    /// every provider is saturated or cooling down. `None` means "try again
    /// later", never a permanent failure.
    pub async fn pick(&self, chain: &[ChainEntry]) -> Option<Picked> {
        for (index, entry) in chain.iter().enumerate() {
            if self.is_eligible(&entry.provider).await {
                return Some(Picked {
                    entry: entry.clone(),
                    index,
                });
            }
            debug!(
                provider = %entry.provider,
                position = index,
                "provider not eligible, trying next in chain"
            );
        }
        None
    }

    /// Record that a request is being submitted to `provider`.
    pub async fn report_submit(&self, provider: &str) {
        self.state.incr(&key(provider, "active"), None).await;
        self.state
            .incr(&key(provider, "rpm"), Some(RPM_WINDOW))
            .await;
    }

    /// Record that `provider` resolved a request successfully.
    ///
    /// Clears the error streak so the next pick sees no cooldown.
    pub async fn report_success(&self, provider: &str) {
        self.state.decr_floor(&key(provider, "active")).await;
        self.state.remove(&key(provider, "last_error")).await;
        self.state.remove(&key(provider, "errors")).await;
    }

    /// Record that `provider` failed a request.
    ///
    /// Starts (or escalates) the cooldown window.
    pub async fn report_error(&self, provider: &str) {
        self.state.decr_floor(&key(provider, "active")).await;
        self.state
            .set(&key(provider, "last_error"), now_ms(), Some(ERROR_WINDOW))
            .await;
        let consecutive = self
            .state
            .incr(&key(provider, "errors"), Some(ERROR_WINDOW))
            .await;
        // Keep the streak window anchored to the latest error
        self.state.expire(&key(provider, "errors"), ERROR_WINDOW).await;

        let cooldown = self
            .limits
            .get(provider)
            .map_or(Duration::ZERO, |l| l.cooldown_window(consecutive as u32));
        warn!(
            provider = %provider,
            consecutive_errors = consecutive,
            cooldown_ms = cooldown.as_millis(),
            "provider error reported, cooldown applied"
        );
    }

    /// Current in-flight count for a provider (diagnostics)
    pub async fn active_count(&self, provider: &str) -> i64 {
        self.state.get(&key(provider, "active")).await.unwrap_or(0)
    }

    async fn is_eligible(&self, provider: &str) -> bool {
        // No configured limits: immediately eligible
        let Some(limits) = self.limits.get(provider) else {
            return true;
        };

        let active = self.state.get(&key(provider, "active")).await.unwrap_or(0);
        if active >= i64::from(limits.max_concurrent) {
            debug!(provider = %provider, active, "at max concurrency");
            return false;
        }

        if let Some(rpm) = limits.requests_per_minute {
            let window = self.state.get(&key(provider, "rpm")).await.unwrap_or(0);
            if window >= i64::from(rpm) {
                debug!(provider = %provider, window, "rpm budget exhausted");
                return false;
            }
        }

        !self.in_cooldown(provider, limits).await
    }

    async fn in_cooldown(&self, provider: &str, limits: &ProviderLimits) -> bool {
        let Some(last_error) = self.state.get(&key(provider, "last_error")).await else {
            return false;
        };
        let consecutive = self.state.get(&key(provider, "errors")).await.unwrap_or(1);
        let window = limits.cooldown_window(consecutive.max(1) as u32);

        let elapsed = now_ms().saturating_sub(last_error);
        elapsed < window.as_millis() as i64
    }
}

fn key(provider: &str, kind: &str) -> String {
    format!("forge:{provider}:{kind}")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
