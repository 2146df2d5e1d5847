//! Deriving limiter settings from an advertised request limit.
//!
//! Servers advertise a per-minute request budget. The limiter is tuned to a
//! fraction of it so that the client stays clear of 429 responses:
//!
//! - refill rate = (limit / 60) * [`RATE_FACTOR`] tokens per second
//! - burst       = floor((limit / 60) * [`BURST_FACTOR`]) tokens

use crate::{LimitHeaders, TokenBucket};
use pacer_error::PacerResult;
use reqwest::header::HeaderMap;
use tracing::debug;

/// Share of the advertised per-second limit used as refill rate.
pub const RATE_FACTOR: f64 = 0.66;

/// Share of the advertised per-second limit used as burst capacity.
pub const BURST_FACTOR: f64 = 0.33;

/// Limiter settings derived from a server-advertised limit.
///
/// # Example
///
/// ```
/// use pacer_rate_limit::Calibration;
///
/// let calibration = Calibration::from_limit(120.0).unwrap();
/// assert!((calibration.rate() - 1.32).abs() < 1e-9);
/// assert_eq!(calibration.burst(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    limit_per_minute: f64,
    rate: f64,
    burst: u32,
}

impl Calibration {
    /// Derive settings from a requests-per-minute limit.
    ///
    /// Returns `None` unless the limit is positive and finite.
    pub fn from_limit(limit_per_minute: f64) -> Option<Self> {
        if !limit_per_minute.is_finite() || limit_per_minute <= 0.0 {
            return None;
        }

        let per_second = limit_per_minute / 60.0;
        let burst = (per_second * BURST_FACTOR).floor();
        Some(Self {
            limit_per_minute,
            rate: per_second * RATE_FACTOR,
            burst: if burst >= u32::MAX as f64 {
                u32::MAX
            } else {
                burst as u32
            },
        })
    }

    /// Derive settings from the limit header of a response.
    pub fn from_headers(headers: &HeaderMap, names: &LimitHeaders) -> Option<Self> {
        let limit = names.limit(headers)?;
        let calibration = Self::from_limit(limit);
        debug!(
            limit,
            usable = calibration.is_some(),
            "Detected rate limit from headers"
        );
        calibration
    }

    /// The advertised requests per minute.
    pub fn limit_per_minute(&self) -> f64 {
        self.limit_per_minute
    }

    /// Refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Burst capacity in tokens.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Build the token bucket these settings describe.
    pub fn bucket(&self) -> PacerResult<TokenBucket> {
        TokenBucket::new(self.rate, self.burst)
    }
}
