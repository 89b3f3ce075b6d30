//! Webhook failure classification.
//!
//! Providers report failures as free-form text; this module buckets them by
//! substring matching against the error and any echoed execution logs.
//! Non-retryable buckets are checked first so that, say, a safety rejection
//! mentioning a timeout still terminates the job.

/// Classified failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Content rejected by the provider's safety system
    SafetyBlocked,
    /// Parameters the provider refused
    InvalidInput,
    /// Provider-side auth, billing, or quota problem
    AccountIssue,
    /// Generation ran out of time
    Timeout,
    /// GPU/memory exhaustion on the worker
    ResourceExhausted,
    /// Provider overloaded or rate limiting
    Overloaded,
    /// No error text; assumed transient
    Transient,
    /// Unrecognized error text
    Unknown,
}

impl FailureKind {
    /// Whether an automatic retry may help.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ResourceExhausted | Self::Overloaded | Self::Transient
        )
    }

    /// User-facing failure message; never leaks raw provider text.
    #[must_use]
    pub fn friendly_message(self) -> &'static str {
        match self {
            Self::SafetyBlocked => {
                "The request was blocked by the provider's content safety system. \
                 Please adjust your prompt and try again."
            }
            Self::InvalidInput => {
                "The provider rejected the generation settings. \
                 Please check your parameters and try again."
            }
            Self::AccountIssue => "Generation failed due to a provider account problem.",
            Self::Timeout => "Generation timed out. Please try again.",
            Self::ResourceExhausted => {
                "The provider ran out of capacity for this request. Please try again shortly."
            }
            Self::Overloaded => {
                "The provider is currently overloaded. Please try again shortly."
            }
            Self::Transient | Self::Unknown => {
                "Generation failed unexpectedly. Please try again."
            }
        }
    }
}

const SAFETY_PATTERNS: &[&str] = &[
    "nsfw",
    "safety",
    "content policy",
    "content_policy",
    "flagged",
    "sensitive content",
    "moderation",
];

const INVALID_PATTERNS: &[&str] = &[
    "invalid input",
    "invalid_input",
    "validation",
    "unprocessable",
    "unsupported",
    "must be",
];

const ACCOUNT_PATTERNS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "forbidden",
    "billing",
    "payment",
    "insufficient credit",
    "quota exceeded",
];

const TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout", "deadline exceeded"];

const RESOURCE_PATTERNS: &[&str] = &[
    "out of memory",
    "oom",
    "cuda error",
    "resource exhausted",
    "no gpu",
];

const OVERLOAD_PATTERNS: &[&str] = &[
    "overload",
    "rate limit",
    "too many requests",
    "capacity",
    "cold boot",
    "warming up",
    "please retry",
    "service unavailable",
    "internal server error",
    "502",
    "503",
];

/// Classify a webhook-reported failure.
///
/// Checks the error text first, then the provider logs. An empty error with
/// nothing recognizable in the logs is assumed transient.
#[must_use]
pub fn classify_failure(error: Option<&str>, logs: Option<&str>) -> FailureKind {
    let error = error.map(str::trim).filter(|e| !e.is_empty());
    let haystack = match (error, logs) {
        (Some(e), Some(l)) => format!("{e}\n{l}").to_lowercase(),
        (Some(e), None) => e.to_lowercase(),
        (None, Some(l)) => l.to_lowercase(),
        (None, None) => return FailureKind::Transient,
    };

    let matches = |patterns: &[&str]| patterns.iter().any(|p| haystack.contains(p));

    // Terminal buckets win over retryable ones
    if matches(SAFETY_PATTERNS) {
        return FailureKind::SafetyBlocked;
    }
    if matches(ACCOUNT_PATTERNS) {
        return FailureKind::AccountIssue;
    }
    if matches(INVALID_PATTERNS) {
        return FailureKind::InvalidInput;
    }

    if matches(TIMEOUT_PATTERNS) {
        return FailureKind::Timeout;
    }
    if matches(RESOURCE_PATTERNS) {
        return FailureKind::ResourceExhausted;
    }
    if matches(OVERLOAD_PATTERNS) {
        return FailureKind::Overloaded;
    }

    if error.is_none() {
        return FailureKind::Transient;
    }
    FailureKind::Unknown
}
