//! Rate limit header detection.
//!
//! Providers advertise their request budget in response headers:
//! - `X-RateLimit-Limit`: requests allowed per minute
//! - `X-RateLimit-Reset`: Unix timestamp (seconds) when the window resets
//!
//! Header names are configurable for APIs that use a different spelling.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default header carrying the per-minute request limit.
pub const DEFAULT_LIMIT_HEADER: &str = "X-RateLimit-Limit";

/// Default header carrying the reset timestamp in epoch seconds.
pub const DEFAULT_RESET_HEADER: &str = "X-RateLimit-Reset";

/// Names of the headers a controller reads rate limit information from.
///
/// # Example
///
/// ```toml
/// [rate_limit]
/// limit_header = "X-RateLimit-Limit"
/// reset_header = "X-RateLimit-Reset"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitHeaders {
    /// Header with the advertised requests-per-minute limit
    #[serde(default = "default_limit_header")]
    pub limit_header: String,

    /// Header with the epoch-seconds reset timestamp
    #[serde(default = "default_reset_header")]
    pub reset_header: String,
}

fn default_limit_header() -> String {
    DEFAULT_LIMIT_HEADER.to_string()
}

fn default_reset_header() -> String {
    DEFAULT_RESET_HEADER.to_string()
}

impl Default for LimitHeaders {
    fn default() -> Self {
        Self {
            limit_header: default_limit_header(),
            reset_header: default_reset_header(),
        }
    }
}

impl LimitHeaders {
    /// Advertised requests per minute, if the header is present and numeric.
    pub fn limit(&self, headers: &HeaderMap) -> Option<f64> {
        parse_header(headers, &self.limit_header)
    }

    /// Reset instant, if the header holds a positive epoch timestamp.
    pub fn reset_at(&self, headers: &HeaderMap) -> Option<SystemTime> {
        let seconds: i64 = parse_header(headers, &self.reset_header)?;
        let seconds = u64::try_from(seconds).ok().filter(|s| *s > 0)?;
        UNIX_EPOCH.checked_add(Duration::from_secs(seconds))
    }

    /// Time left until the reset instant; `None` when absent or already past.
    pub fn until_reset(&self, headers: &HeaderMap) -> Option<Duration> {
        self.reset_at(headers)?
            .duration_since(SystemTime::now())
            .ok()
    }
}

/// Helper to parse a header value.
fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, key: &str) -> Option<T> {
    headers.get(key)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_limit_parses_float() {
        let names = LimitHeaders::default();
        assert_eq!(names.limit(&headers(&[("x-ratelimit-limit", "120")])), Some(120.0));
        assert_eq!(names.limit(&headers(&[("x-ratelimit-limit", "7.5")])), Some(7.5));
        assert_eq!(names.limit(&headers(&[("x-ratelimit-limit", "lots")])), None);
        assert_eq!(names.limit(&HeaderMap::new()), None);
    }

    #[test]
    fn test_reset_requires_positive_timestamp() {
        let names = LimitHeaders::default();
        assert_eq!(names.reset_at(&headers(&[("x-ratelimit-reset", "0")])), None);
        assert_eq!(names.reset_at(&headers(&[("x-ratelimit-reset", "-5")])), None);
        assert_eq!(
            names.reset_at(&headers(&[("x-ratelimit-reset", "1700000000")])),
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn test_until_reset_ignores_past_timestamps() {
        let names = LimitHeaders::default();
        assert_eq!(
            names.until_reset(&headers(&[("x-ratelimit-reset", "1000")])),
            None
        );

        let future = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 30;
        let wait = names
            .until_reset(&headers(&[("x-ratelimit-reset", &future.to_string())]))
            .unwrap();
        assert!(wait > Duration::from_secs(28));
        assert!(wait <= Duration::from_secs(30));
    }

    #[test]
    fn test_custom_header_names() {
        let names = LimitHeaders {
            limit_header: "RateLimit-Policy".to_string(),
            reset_header: "RateLimit-Reset".to_string(),
        };
        assert_eq!(names.limit(&headers(&[("ratelimit-policy", "60")])), Some(60.0));
        assert_eq!(names.limit(&headers(&[("x-ratelimit-limit", "60")])), None);
    }
}
