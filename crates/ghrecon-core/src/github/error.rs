//! Typed API errors and their classification.

use thiserror::Error;
use tracing::{error, info, warn};

/// Errors surfaced by GitHub API calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiError {
    /// Core/search quota exhausted.
    #[error("API rate limit exceeded (resets in {reset_in_secs}s)")]
    RateLimited {
        /// Seconds until the quota resets.
        reset_in_secs: u64,
    },

    /// Secondary (abuse) rate limit triggered.
    #[error("abuse rate limit triggered (retry after {retry_after_secs}s)")]
    AbuseThrottled {
        /// Seconds the API asked us to back off.
        retry_after_secs: u64,
    },

    /// The entity does not exist (deleted issue/PR, renamed repo).
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection, TLS, or timeout failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// Any other non-success response.
    #[error("unexpected API response (status {status}): {body}")]
    Unexpected {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },
}

/// What a failed API call means for the candidate that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota exhausted: skip the candidate, the next scheduled run retries.
    RateLimited,
    /// Abuse throttle: same handling as rate-limited.
    AbuseThrottled,
    /// Deleted entity, not a bug: skip the candidate.
    NotFound,
    /// Transient failure: log and end the run with exit status 0.
    Transient,
    /// Everything else: log and end the run with exit status 0.
    Fatal,
}

impl ErrorClass {
    /// True for classes where only the affected candidate is skipped and
    /// the run continues.
    #[must_use]
    pub const fn is_skippable(self) -> bool {
        matches!(self, Self::RateLimited | Self::AbuseThrottled | Self::NotFound)
    }
}

/// Classifies an API error.
///
/// A response body containing `404 Not Found` classifies as not-found
/// even when the status code was lost along the way, matching how other
/// consumers of the same store recognize deleted entities.
#[must_use]
pub fn classify(err: &ApiError) -> ErrorClass {
    match err {
        ApiError::RateLimited { .. } => ErrorClass::RateLimited,
        ApiError::AbuseThrottled { .. } => ErrorClass::AbuseThrottled,
        ApiError::NotFound(_) => ErrorClass::NotFound,
        ApiError::Network(_) => ErrorClass::Transient,
        ApiError::Unexpected { status, body } => {
            if *status == 404 || body.contains("404 Not Found") {
                ErrorClass::NotFound
            } else if *status >= 500 {
                ErrorClass::Transient
            } else {
                ErrorClass::Fatal
            }
        },
    }
}

/// Applies the run policy to a failed API call.
///
/// Skippable classes (rate limit, abuse throttle, not found) are logged
/// with the caller's context and returned so the caller drops the
/// affected candidate; the next scheduled run retries. Anything else is
/// logged and ends the process with exit status 0: the outer scheduler
/// treats the run as done-for-now rather than alert-worthy, and retry
/// is its job, not the engine's.
pub fn handle_api_error(err: &ApiError, context: &str) -> ErrorClass {
    let class = classify(err);
    match class {
        ErrorClass::RateLimited => warn!(context, error = %err, "rate limited, skipping"),
        ErrorClass::AbuseThrottled => warn!(context, error = %err, "abuse throttle, skipping"),
        ErrorClass::NotFound => info!(context, error = %err, "entity not found, skipping"),
        ErrorClass::Transient | ErrorClass::Fatal => {
            error!(context, error = %err, "non-recoverable API error, exiting 0 for rerun");
            std::process::exit(0);
        },
    }
    class
}
