//! Backoff policy between retry attempts.
//!
//! Two regimes:
//! - **Rate limited (429)**: wait at least `min`, stretched to the server's
//!   reset timestamp when one is advertised, plus jitter below `max - min`.
//! - **Everything else** (5xx, connection failures): a short fixed window,
//!   independent of the caller's bounds, so infrastructure blips are retried
//!   quickly instead of waiting out a rate limit window.

use pacer_error::ApiResponse;
use pacer_rate_limit::LimitHeaders;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Lower bound of the window used for server and connection failures.
pub const SERVER_WAIT_MIN: Duration = Duration::from_millis(700);

/// Upper bound of the window used for server and connection failures.
pub const SERVER_WAIT_MAX: Duration = Duration::from_millis(900);

/// Computes how long to wait before the next attempt.
///
/// `attempt` is the number of the retry about to happen: the initial send is
/// attempt 0, so the first retry asks with `attempt == 1`. `previous` is the
/// response that triggered the retry, or `None` after a transport failure.
pub trait Backoff: Send + Sync {
    /// Delay before retry number `attempt`.
    fn backoff(
        &self,
        min: Duration,
        max: Duration,
        attempt: u32,
        previous: Option<&ApiResponse>,
    ) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(Duration, Duration, u32, Option<&ApiResponse>) -> Duration + Send + Sync,
{
    fn backoff(
        &self,
        min: Duration,
        max: Duration,
        attempt: u32,
        previous: Option<&ApiResponse>,
    ) -> Duration {
        self(min, max, attempt, previous)
    }
}

/// Default backoff: rate limit aware for 429, tightened window otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultBackoff {
    headers: LimitHeaders,
    server_min: Duration,
    server_max: Duration,
}

impl DefaultBackoff {
    /// Backoff reading the reset timestamp from `headers`.
    pub fn new(headers: LimitHeaders) -> Self {
        Self {
            headers,
            server_min: SERVER_WAIT_MIN,
            server_max: SERVER_WAIT_MAX,
        }
    }

    /// Override the server failure window.
    pub fn with_server_window(mut self, min: Duration, max: Duration) -> Self {
        self.server_min = min;
        self.server_max = max;
        self
    }

    /// The server failure window.
    pub fn server_window(&self) -> (Duration, Duration) {
        (self.server_min, self.server_max)
    }
}

impl Default for DefaultBackoff {
    fn default() -> Self {
        Self::new(LimitHeaders::default())
    }
}

impl Backoff for DefaultBackoff {
    fn backoff(
        &self,
        min: Duration,
        max: Duration,
        attempt: u32,
        previous: Option<&ApiResponse>,
    ) -> Duration {
        match previous {
            Some(response) if *response.status() == StatusCode::TOO_MANY_REQUESTS => {
                rate_limit_backoff(min, max, Some(response.headers()), &self.headers)
            }
            _ => linear_jitter_backoff(self.server_min, self.server_max, attempt),
        }
    }
}

/// Backoff for a 429 response.
///
/// Draws jitter in `[0, max - min)`. If `headers` carry a reset timestamp
/// further away than `min`, the time until that reset replaces `min`.
pub fn rate_limit_backoff(
    min: Duration,
    max: Duration,
    headers: Option<&HeaderMap>,
    names: &LimitHeaders,
) -> Duration {
    let jitter = random_below(max.saturating_sub(min));

    let min = match headers.and_then(|headers| names.until_reset(headers)) {
        Some(wait) if wait > min => wait,
        _ => min,
    };

    min + jitter
}

/// Linear backoff with jitter, capped at `max`.
///
/// A random point in `[min, max)` is scaled by the attempt number, so later
/// attempts hit the cap. Attempt 0 is treated as 1.
pub fn linear_jitter_backoff(min: Duration, max: Duration, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    if max <= min {
        return min;
    }

    let base = min + random_below(max - min);
    base.saturating_mul(attempt).min(max)
}

/// Uniform random duration in `[0, span)`.
fn random_below(span: Duration) -> Duration {
    let nanos = u64::try_from(span.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..nanos))
}
