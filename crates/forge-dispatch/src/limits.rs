//! Static per-provider rate and concurrency policy.

use std::collections::HashMap;
use std::time::Duration;

/// Escalating cooldown multipliers applied per consecutive error.
///
/// The first error costs the base cooldown, the second three times that,
/// and so on, capped at the last entry.
pub const COOLDOWN_MULTIPLIERS: [u32; 4] = [1, 3, 6, 12];

/// Limits for one provider. A provider absent from the table is treated as
/// unlimited and always eligible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLimits {
    /// Maximum in-flight requests
    pub max_concurrent: u32,
    /// Rolling 60-second request budget, if any
    pub requests_per_minute: Option<u32>,
    /// Base penalty window after an error
    pub cooldown: Duration,
}

impl ProviderLimits {
    /// Create limits with no RPM budget
    #[must_use]
    pub fn concurrency(max_concurrent: u32, cooldown: Duration) -> Self {
        Self {
            max_concurrent,
            requests_per_minute: None,
            cooldown,
        }
    }

    /// Set the RPM budget
    #[must_use]
    pub fn with_rpm(mut self, rpm: u32) -> Self {
        self.requests_per_minute = Some(rpm);
        self
    }

    /// Cooldown window for a given consecutive-error count.
    ///
    /// Monotonically non-decreasing in `consecutive_errors`, capped at the
    /// last multiplier.
    #[must_use]
    pub fn cooldown_window(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors == 0 {
            return Duration::ZERO;
        }
        let index = ((consecutive_errors - 1) as usize).min(COOLDOWN_MULTIPLIERS.len() - 1);
        self.cooldown * COOLDOWN_MULTIPLIERS[index]
    }
}

/// Lookup table of provider limits.
#[derive(Debug, Clone, Default)]
pub struct LimitsTable {
    entries: HashMap<String, ProviderLimits>,
}

impl LimitsTable {
    /// Create an empty table (every provider unlimited)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in production policy.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with_limits(
                "fireworks",
                ProviderLimits::concurrency(8, Duration::from_secs(5)).with_rpm(600),
            )
            .with_limits(
                "replicate",
                ProviderLimits::concurrency(10, Duration::from_secs(10)).with_rpm(600),
            )
            .with_limits(
                "fal",
                ProviderLimits::concurrency(20, Duration::from_secs(10)).with_rpm(120),
            )
            .with_limits(
                "runpod",
                ProviderLimits::concurrency(4, Duration::from_secs(30)),
            )
    }

    /// Add or replace limits for a provider
    #[must_use]
    pub fn with_limits(mut self, provider: impl Into<String>, limits: ProviderLimits) -> Self {
        self.entries.insert(provider.into(), limits);
        self
    }

    /// Look up the limits for a provider
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<&ProviderLimits> {
        self.entries.get(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_escalation() {
        let limits = ProviderLimits::concurrency(4, Duration::from_secs(10));

        assert_eq!(limits.cooldown_window(0), Duration::ZERO);
        assert_eq!(limits.cooldown_window(1), Duration::from_secs(10));
        assert_eq!(limits.cooldown_window(2), Duration::from_secs(30));
        assert_eq!(limits.cooldown_window(3), Duration::from_secs(60));
        assert_eq!(limits.cooldown_window(4), Duration::from_secs(120));
        // Capped at the last multiplier
        assert_eq!(limits.cooldown_window(5), Duration::from_secs(120));
        assert_eq!(limits.cooldown_window(100), Duration::from_secs(120));
    }

    #[test]
    fn test_cooldown_monotonic() {
        let limits = ProviderLimits::concurrency(4, Duration::from_secs(7));
        let mut prev = Duration::ZERO;
        for errors in 0..10 {
            let window = limits.cooldown_window(errors);
            assert!(window >= prev, "window shrank at {errors} errors");
            prev = window;
        }
    }

    #[test]
    fn test_builtin_table() {
        let table = LimitsTable::builtin();

        let fireworks = table.get("fireworks").expect("fireworks limits");
        assert_eq!(fireworks.max_concurrent, 8);
        assert_eq!(fireworks.requests_per_minute, Some(600));

        let runpod = table.get("runpod").expect("runpod limits");
        assert_eq!(runpod.requests_per_minute, None);

        assert!(table.get("unknown").is_none());
    }
}
