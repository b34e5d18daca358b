//! Retry policy and response classification for catalog requests.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;

use crate::error::ResolveError;

/// Maximum number of attempts for one logical request.
pub const MAX_ATTEMPTS: usize = 3;

/// Delay before the first retry; doubles on every further attempt.
pub const INITIAL_DELAY_MS: u64 = 1000;

pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// How often and how patiently to retry transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Backoff before the retry that follows zero-based `attempt`:
    /// `initial_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

/// Reset time (epoch seconds) if the response is a rate-limit rejection.
///
/// Recognized as 403 or 429 with a zero remaining quota and a reset header.
pub fn rate_limit_reset(status: StatusCode, headers: &HeaderMap) -> Option<u64> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };
    let remaining = header(RATE_LIMIT_REMAINING_HEADER)?.parse::<u64>().ok()?;
    if remaining != 0 {
        return None;
    }
    header(RATE_LIMIT_RESET_HEADER)?.parse::<u64>().ok()
}

/// Converts a non-success, non-304 response into an error.
///
/// Rate limits and 4xx are final. 5xx yields a retryable fetch error.
pub fn classify_status(url: &str, status: StatusCode, headers: &HeaderMap) -> ResolveError {
    if let Some(reset_time) = rate_limit_reset(status, headers) {
        return ResolveError::RateLimit {
            url: url.to_string(),
            reset_time,
        };
    }

    let message = match status {
        StatusCode::UNAUTHORIZED => "authentication failed, check the catalog headers".to_string(),
        StatusCode::FORBIDDEN => "access to this resource is forbidden".to_string(),
        StatusCode::NOT_FOUND => "the requested resource was not found".to_string(),
        s if s.is_server_error() => format!("server error HTTP {}", s.as_u16()),
        s => format!("HTTP {} error", s.as_u16()),
    };

    ResolveError::fetch(url, Some(status.as_u16()), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, MAX_ATTEMPTS);
        assert_eq!(policy.initial_delay, Duration::from_millis(INITIAL_DELAY_MS));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_policy_needs_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_rate_limit_detected() {
        let h = headers(&[
            (RATE_LIMIT_REMAINING_HEADER, "0"),
            (RATE_LIMIT_RESET_HEADER, "1700000000"),
        ]);
        assert_eq!(rate_limit_reset(StatusCode::FORBIDDEN, &h), Some(1700000000));
        assert_eq!(
            rate_limit_reset(StatusCode::TOO_MANY_REQUESTS, &h),
            Some(1700000000)
        );
        assert_eq!(rate_limit_reset(StatusCode::NOT_FOUND, &h), None);
    }

    #[test]
    fn test_rate_limit_requires_zero_remaining_and_reset() {
        let remaining = headers(&[
            (RATE_LIMIT_REMAINING_HEADER, "12"),
            (RATE_LIMIT_RESET_HEADER, "1700000000"),
        ]);
        assert_eq!(rate_limit_reset(StatusCode::FORBIDDEN, &remaining), None);

        let no_reset = headers(&[(RATE_LIMIT_REMAINING_HEADER, "0")]);
        assert_eq!(rate_limit_reset(StatusCode::FORBIDDEN, &no_reset), None);
    }

    #[test]
    fn test_classify_status() {
        let empty = HeaderMap::new();

        let err = classify_status("u", StatusCode::NOT_FOUND, &empty);
        assert!(matches!(
            err,
            ResolveError::CatalogFetch {
                status: Some(404),
                ..
            }
        ));
        assert!(!err.is_retryable());

        let err = classify_status("u", StatusCode::FORBIDDEN, &empty);
        assert!(err.to_string().contains("forbidden"));
        assert!(!err.is_retryable());

        let err = classify_status("u", StatusCode::BAD_GATEWAY, &empty);
        assert!(err.is_retryable());

        let limited = headers(&[
            (RATE_LIMIT_REMAINING_HEADER, "0"),
            (RATE_LIMIT_RESET_HEADER, "42"),
        ]);
        let err = classify_status("u", StatusCode::FORBIDDEN, &limited);
        assert_eq!(
            err,
            ResolveError::RateLimit {
                url: "u".into(),
                reset_time: 42
            }
        );
    }
}
