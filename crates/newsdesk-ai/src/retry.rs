//! Retry policy for chat-completion requests.

use std::{
    collections::hash_map::RandomState,
    hash::BuildHasher,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use newsdesk_core::current_unix_timestamp_ms;
use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    StatusCode,
};

const BACKOFF_FLOOR_MS: u64 = 200;
const BACKOFF_MAX_DOUBLINGS: u32 = 6;

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How often and how long a completion request may be retried.
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: usize,
    /// Cumulative wall-clock budget for retries; `0` means unbounded.
    pub(crate) budget_ms: u64,
    pub(crate) jitter: bool,
}

impl RetryPolicy {
    /// Returns the pause before attempt `attempt + 1`, or `None` once the
    /// attempts or the budget are spent.
    ///
    /// A `Retry-After` hint from the provider is honored as a lower bound.
    pub(crate) fn next_delay(
        &self,
        attempt: usize,
        elapsed_ms: u64,
        retry_after_ms: Option<u64>,
    ) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let delay_ms = self
            .backoff_ms(attempt)
            .max(retry_after_ms.unwrap_or_default());
        if self.budget_ms > 0 && elapsed_ms.saturating_add(delay_ms) > self.budget_ms {
            return None;
        }
        Some(Duration::from_millis(delay_ms))
    }

    fn backoff_ms(&self, attempt: usize) -> u64 {
        let doublings = u32::try_from(attempt)
            .unwrap_or(u32::MAX)
            .min(BACKOFF_MAX_DOUBLINGS);
        let ceiling = BACKOFF_FLOOR_MS << doublings;
        if !self.jitter {
            return ceiling;
        }
        // Uniform in the upper half of the window.
        let half = ceiling / 2;
        half + RandomState::new().hash_one(attempt) % (half + 1)
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::CONFLICT
                | StatusCode::TOO_EARLY
                | StatusCode::TOO_MANY_REQUESTS
        )
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Reads `Retry-After` as delta-seconds or an HTTP date.
pub(crate) fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1_000));
    }
    let retry_at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let remaining = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    Some(u64::try_from(remaining).unwrap_or(0))
}

pub(crate) fn new_request_id() -> String {
    let sequence = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("newsdesk-{}-{sequence}", current_unix_timestamp_ms())
}
