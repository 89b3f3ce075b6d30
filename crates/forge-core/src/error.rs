//! Error types for MediaForge.

use thiserror::Error;

/// Result alias used throughout the service.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// One failed attempt within a provider chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAttempt {
    /// Provider that was tried.
    pub provider: String,
    /// Why the attempt failed.
    pub message: String,
}

impl std::fmt::Display for ChainAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.message)
    }
}

/// Top-level error type for the service.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Invalid or missing configuration (empty chain, unknown model).
    /// Fatal to the affected job; never retried.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the problem
        message: String,
    },

    /// Request parameters rejected before reaching any provider.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the problem
        message: String,
    },

    /// A provider rejected or failed a submission.
    #[error("Provider {provider} error: {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error detail
        message: String,
        /// HTTP status from the provider, when available
        status_code: Option<u16>,
        /// Whether the error is worth retrying elsewhere
        retryable: bool,
    },

    /// Every provider in the chain was tried and failed.
    #[error("all providers failed: {}", format_attempts(.attempts))]
    ChainExhausted {
        /// Per-provider failure reasons, in chain order
        attempts: Vec<ChainAttempt>,
    },

    /// Job record store failure.
    #[error("Store error: {message}")]
    Store {
        /// Description of the problem
        message: String,
    },

    /// Work queue failure.
    #[error("Queue error: {message}")]
    Queue {
        /// Description of the problem
        message: String,
    },

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the problem
        message: String,
    },
}

fn format_attempts(attempts: &[ChainAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ForgeError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a chain-exhausted error from the recorded attempts
    pub fn chain_exhausted(attempts: Vec<ChainAttempt>) -> Self {
        Self::ChainExhausted { attempts }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the operation that produced this error may succeed elsewhere.
    ///
    /// Chain exhaustion is terminal: every option was already tried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Queue { .. } | Self::Store { .. } => true,
            _ => false,
        }
    }
}
