//! Error taxonomy for the API access layer.
//!
//! The gateway distinguishes terminal failures (transport budget exhausted,
//! upstream that never stops throttling) from ordinary unsuccessful
//! responses, which it returns as-is. The fetch-wrapper layer then collapses
//! every failure into a [`FallbackReason`] and resolves it locally to the
//! resource's fallback shape; callers above the wrappers never see an error.

use reqwest::StatusCode;
use thiserror::Error;

/// Terminal failure from the fetch gateway.
///
/// Rate-limit (429) responses never appear here directly: the gateway keeps
/// retrying them with the server-supplied delay and only gives up when the
/// dispatch budget runs out.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure (connect error, timeout) after the full
    /// attempt budget.
    #[error("request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream kept answering 429 for every dispatch in the budget.
    #[error("upstream still rate limiting after {attempts} dispatches")]
    RateLimitExhausted { attempts: u32 },
}

/// Why a resource fetch fell back to its default shape.
///
/// This is the wrapper layer's catch-all. It is logged and then swallowed:
/// the public wrapper contract is that a data-shaped value always comes back.
#[derive(Debug, Error)]
pub enum FallbackReason {
    /// The gateway gave up on the call.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Upstream answered with a non-success status.
    #[error("upstream returned {0}")]
    Status(StatusCode),

    /// The body did not match the expected schema.
    #[error("malformed response body: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Result of a resource fetch: real data, or the fallback shape plus the
/// reason it was substituted.
///
/// Either variant carries a value of the resource's documented shape, so
/// consumers can always call [`FetchOutcome::value`] and move on. The
/// suppressed reason stays observable for logging and tests.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// The upstream call succeeded and the payload parsed.
    Fetched(T),
    /// Something failed; `value` is the resource's fallback shape.
    Fallback { value: T, reason: FallbackReason },
}

impl<T> FetchOutcome<T> {
    /// Unwrap to the data-shaped value, fetched or fallback.
    pub fn value(self) -> T {
        match self {
            FetchOutcome::Fetched(value) => value,
            FetchOutcome::Fallback { value, .. } => value,
        }
    }

    /// The suppressed failure, if this outcome is a fallback.
    pub fn reason(&self) -> Option<&FallbackReason> {
        match self {
            FetchOutcome::Fetched(_) => None,
            FetchOutcome::Fallback { reason, .. } => Some(reason),
        }
    }

    /// True when real upstream data came back.
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }

    /// Map the carried value, preserving the outcome.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Fetched(value) => FetchOutcome::Fetched(f(value)),
            FetchOutcome::Fallback { value, reason } => FetchOutcome::Fallback {
                value: f(value),
                reason,
            },
        }
    }

    /// Build an outcome from a wrapper-internal result, logging the
    /// suppressed reason when falling back.
    pub(crate) fn from_result(
        resource: &str,
        result: Result<T, FallbackReason>,
        fallback: impl FnOnce() -> T,
    ) -> Self {
        match result {
            Ok(value) => FetchOutcome::Fetched(value),
            Err(reason) => {
                tracing::warn!(
                    resource = resource,
                    reason = %reason,
                    "Resource unavailable, serving fallback shape"
                );
                FetchOutcome::Fallback {
                    value: fallback(),
                    reason,
                }
            }
        }
    }
}
