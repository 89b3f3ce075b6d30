//! Provider-chain resolution.
//!
//! Computes the ordered, filtered list of providers to try for a model.
//! Filters compose in a fixed order (exclusion, inclusion-only, promotion)
//! so an excluded provider can never be promoted back in.

use forge_core::{ForgeError, ForgeResult, ModelSpec};

/// One resolved hop: provider name plus its model string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    /// Provider name
    pub provider: String,
    /// Provider-specific model string
    pub model: String,
}

/// Operator-controlled chain filters, usually sourced from the environment.
#[derive(Debug, Clone, Default)]
pub struct ChainFilters {
    /// Providers removed from every chain
    pub exclude: Vec<String>,
    /// When set, keep only this provider's entries
    pub only: Option<String>,
    /// When set, move this provider's entries to the front
    pub prefer: Option<String>,
}

impl ChainFilters {
    /// No filtering
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Read filters from `FORGE_PROVIDERS_EXCLUDE` (comma-separated),
    /// `FORGE_PROVIDER_ONLY`, and `FORGE_PROVIDER_PREFER`.
    #[must_use]
    pub fn from_env() -> Self {
        let exclude = std::env::var("FORGE_PROVIDERS_EXCLUDE")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let non_empty = |raw: String| {
            let trimmed = raw.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        };

        Self {
            exclude,
            only: std::env::var("FORGE_PROVIDER_ONLY").ok().and_then(non_empty),
            prefer: std::env::var("FORGE_PROVIDER_PREFER")
                .ok()
                .and_then(non_empty),
        }
    }
}

/// Resolve the ordered chain for a model.
///
/// # Errors
/// Returns a configuration error when the model has no chain configured or
/// filtering removes every entry. Callers must fail fast, never fall back
/// to an empty chain.
pub fn resolve_chain(spec: &ModelSpec, filters: &ChainFilters) -> ForgeResult<Vec<ChainEntry>> {
    let mut chain: Vec<ChainEntry> = spec
        .base_chain()?
        .into_iter()
        .map(|hop| ChainEntry {
            provider: hop.provider,
            model: hop.model,
        })
        .collect();

    if !filters.exclude.is_empty() {
        chain.retain(|entry| !filters.exclude.contains(&entry.provider));
    }

    if let Some(only) = &filters.only {
        chain.retain(|entry| entry.provider == *only);
    }

    if let Some(prefer) = &filters.prefer {
        // Stable: promoted entries keep their order, as do the rest
        let (mut front, rest): (Vec<_>, Vec<_>) = chain
            .into_iter()
            .partition(|entry| entry.provider == *prefer);
        front.extend(rest);
        chain = front;
    }

    if chain.is_empty() {
        return Err(ForgeError::configuration(format!(
            "provider chain for model {} is empty after filtering",
            spec.id
        )));
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::{MediaKind, ProviderModelRef};

    fn spec(providers: &[(&str, &str)]) -> ModelSpec {
        ModelSpec::new(
            "test-model",
            MediaKind::Image,
            providers
                .iter()
                .map(|(p, m)| ProviderModelRef {
                    provider: (*p).to_string(),
                    model: (*m).to_string(),
                })
                .collect(),
        )
    }

    fn providers(chain: &[ChainEntry]) -> Vec<&str> {
        chain.iter().map(|e| e.provider.as_str()).collect()
    }

    #[test]
    fn test_unfiltered_chain_preserves_order() {
        let spec = spec(&[("fal", "a"), ("replicate", "b"), ("fireworks", "c")]);
        let chain = resolve_chain(&spec, &ChainFilters::none()).expect("chain");
        assert_eq!(providers(&chain), vec!["fal", "replicate", "fireworks"]);
    }

    #[test]
    fn test_exclusion() {
        let spec = spec(&[("fal", "a"), ("replicate", "b"), ("fireworks", "c")]);
        let filters = ChainFilters {
            exclude: vec!["replicate".to_string()],
            ..Default::default()
        };

        let chain = resolve_chain(&spec, &filters).expect("chain");
        assert_eq!(providers(&chain), vec!["fal", "fireworks"]);
    }

    #[test]
    fn test_inclusion_only() {
        let spec = spec(&[("fal", "a"), ("replicate", "b"), ("fireworks", "c")]);
        let filters = ChainFilters {
            only: Some("replicate".to_string()),
            ..Default::default()
        };

        let chain = resolve_chain(&spec, &filters).expect("chain");
        assert_eq!(providers(&chain), vec!["replicate"]);
    }

    #[test]
    fn test_promotion_preserves_relative_order() {
        let spec = spec(&[("fal", "a"), ("replicate", "b"), ("fireworks", "c")]);
        let filters = ChainFilters {
            prefer: Some("fireworks".to_string()),
            ..Default::default()
        };

        let chain = resolve_chain(&spec, &filters).expect("chain");
        assert_eq!(providers(&chain), vec!["fireworks", "fal", "replicate"]);
    }

    #[test]
    fn test_exclusion_wins_over_promotion() {
        let spec = spec(&[("fal", "a"), ("replicate", "b")]);
        let filters = ChainFilters {
            exclude: vec!["replicate".to_string()],
            prefer: Some("replicate".to_string()),
            ..Default::default()
        };

        let chain = resolve_chain(&spec, &filters).expect("chain");
        assert_eq!(providers(&chain), vec!["fal"]);
    }

    #[test]
    fn test_empty_after_filtering_is_error() {
        let spec = spec(&[("fal", "a")]);
        let filters = ChainFilters {
            exclude: vec!["fal".to_string()],
            ..Default::default()
        };

        let err = resolve_chain(&spec, &filters).expect_err("must fail");
        assert!(matches!(err, ForgeError::Configuration { .. }));
    }

    #[test]
    fn test_only_unknown_provider_is_error() {
        let spec = spec(&[("fal", "a"), ("replicate", "b")]);
        let filters = ChainFilters {
            only: Some("runpod".to_string()),
            ..Default::default()
        };

        assert!(resolve_chain(&spec, &filters).is_err());
    }

    #[test]
    fn test_chain_length_bounds() {
        let spec = spec(&[("fal", "a"), ("replicate", "b"), ("fireworks", "c")]);
        for filters in [
            ChainFilters::none(),
            ChainFilters {
                exclude: vec!["fal".to_string()],
                ..Default::default()
            },
            ChainFilters {
                prefer: Some("replicate".to_string()),
                ..Default::default()
            },
        ] {
            let chain = resolve_chain(&spec, &filters).expect("chain");
            assert!(!chain.is_empty() && chain.len() <= 3);
        }
    }
}
