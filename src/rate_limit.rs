//! Rate limit hints parsed from response headers.
//!
//! The tracking service throttles bulk reads and answers with `429` plus
//! standard rate limit headers. [`RateLimitInfo`] captures those headers so
//! the retry loop can wait out the server-indicated interval instead of its
//! own backoff.

use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Rate limit data extracted from a response.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// When the current window resets (`X-RateLimit-Reset` / `RateLimit-Reset`).
    pub reset_at: Option<SystemTime>,

    /// Server-requested wait (`Retry-After`, seconds or HTTP date).
    pub retry_after: Option<Duration>,

    /// Requests remaining in the window (`X-RateLimit-Remaining`).
    pub remaining: Option<u64>,
}

impl RateLimitInfo {
    /// Parses rate limit headers from a response.
    ///
    /// # Examples
    ///
    /// ```
    /// use trackline::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers);
    /// assert!(info.is_limited());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            reset_at: parse_reset(headers),
            retry_after: parse_retry_after(headers),
            remaining: parse_u64_header(headers, "x-ratelimit-remaining"),
        }
    }

    /// Returns the wait the server asks for, capped at `max_wait`.
    ///
    /// Prefers an explicit `Retry-After`; falls back to the time until the
    /// window resets. `None` when the headers carried no usable hint.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }

        let until_reset = self.reset_at?.duration_since(SystemTime::now()).ok()?;
        Some(until_reset.min(max_wait))
    }

    /// Returns `true` when the server signaled an active limit: a
    /// `Retry-After` was sent, or the window is out of requests.
    pub fn is_limited(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }
}

/// Controls whether and how far the retry loop honors rate limit hints.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether rate limit headers influence retry delays.
    pub enabled: bool,

    /// Longest server-requested wait that will be honored.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait: Duration::from_secs(300),
        }
    }
}

impl RateLimitConfig {
    /// A config that ignores rate limit headers entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// A config honoring hints up to `max_wait`.
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            enabled: true,
            max_wait,
        }
    }
}

/// `Retry-After`: delay-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = httpdate::parse_http_date(value).ok()?;
    at.duration_since(SystemTime::now()).ok()
}

/// `X-RateLimit-Reset` or the draft-standard `RateLimit-Reset`, as a Unix
/// timestamp.
fn parse_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .find_map(|name| parse_u64_header(headers, name))
        .map(|timestamp| UNIX_EPOCH + Duration::from_secs(timestamp))
}

fn parse_u64_header(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("60"));

        let info = RateLimitInfo::from_headers(&headers);
        assert_eq!(info.retry_after, Some(Duration::from_secs(60)));
        assert!(info.is_limited());
    }

    #[test]
    fn reset_timestamp_yields_delay() {
        let mut headers = HeaderMap::new();
        let reset = SystemTime::now() + Duration::from_secs(120);
        let timestamp = reset.duration_since(UNIX_EPOCH).unwrap().as_secs();
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&timestamp.to_string()).unwrap(),
        );
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));

        let info = RateLimitInfo::from_headers(&headers);
        assert!(info.is_limited());

        // Whole-second timestamps truncate, so allow a generous band.
        let delay = info.delay(Duration::from_secs(300)).unwrap();
        assert!(delay > Duration::from_secs(100) && delay <= Duration::from_secs(120));
    }

    #[test]
    fn remaining_without_limit_is_not_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));

        let info = RateLimitInfo::from_headers(&headers);
        assert_eq!(info.remaining, Some(42));
        assert!(!info.is_limited());
        assert_eq!(info.delay(Duration::from_secs(300)), None);
    }

    #[test]
    fn delay_is_capped_by_max_wait() {
        let info = RateLimitInfo {
            reset_at: None,
            retry_after: Some(Duration::from_secs(600)),
            remaining: Some(0),
        };

        assert_eq!(
            info.delay(Duration::from_secs(300)),
            Some(Duration::from_secs(300))
        );
    }
}
