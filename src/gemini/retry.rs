//! Retry and backoff utilities for Gemini API operations.
//!
//! Handles transient network errors, rate limiting and exponential backoff.

use std::time::Duration;

/// Default number of retry attempts for rate-limited requests.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default number of retry attempts for transient network errors.
pub const DEFAULT_NETWORK_RETRIES: u32 = 3;

/// Base delay for exponential backoff (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Maximum delay cap for exponential backoff (60 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Retry budget applied to every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub network_retries: u32,
    pub rate_limit_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network_retries: DEFAULT_NETWORK_RETRIES,
            rate_limit_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            network_retries: 0,
            rate_limit_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before the next rate-limited attempt. `Retry-After` wins when present.
    pub fn rate_limit_delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs).min(self.backoff_max),
            None => calculate_backoff(attempt, self.backoff_base, self.backoff_max),
        }
    }
}

/// Determine if a reqwest error is a transient network error that should be retried.
///
/// Returns true for connection errors, timeouts, and other temporary failures.
pub fn is_transient_network_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() || error.is_body() {
        return true;
    }

    // 502 Bad Gateway, 503 Service Unavailable, 504 Gateway Timeout
    if let Some(status) = error.status() {
        return matches!(status.as_u16(), 502..=504);
    }

    false
}

/// Parse the Retry-After header value in seconds.
///
/// Only the integer form is understood; HTTP-date values yield `None`.
pub fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Calculate exponential backoff delay with jitter.
///
/// Uses the formula: min(base * 2^attempt + jitter, max_delay)
/// where jitter is half the base, capped at 500ms.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter_ms = (base.as_millis() as u64).min(1000);
    let jitter = Duration::from_millis(jitter_ms / 2);
    exponential.saturating_add(jitter).min(max)
}
