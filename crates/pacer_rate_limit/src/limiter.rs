//! Token bucket limiter backed by governor.
//!
//! The GCRA (Generic Cell Rate Algorithm) used by governor is a lock-free
//! token bucket: tokens refill at a steady rate up to a burst capacity and
//! each admitted call consumes one.

use crate::CallContext;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use pacer_error::{PacerError, PacerErrorKind, PacerResult};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

// Type alias for our direct rate limiter
type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Longest refill period a bucket accepts, one token per day.
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Contract for limiters a controller can wait on.
///
/// Implementations must be internally synchronized; a controller shares one
/// limiter across all concurrent callers.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Block until one token is available or the context finishes.
    ///
    /// Returns a `Cancelled` error in the latter case.
    async fn wait(&self, ctx: &CallContext) -> PacerResult<()>;
}

/// Default token bucket limiter.
///
/// Either unconstrained (never blocks) or a governor limiter with a refill
/// rate in tokens per second and a burst capacity.
///
/// # Example
///
/// ```rust,ignore
/// use pacer_rate_limit::{CallContext, RateLimiter, TokenBucket};
///
/// let bucket = TokenBucket::new(2.0, 4)?;
/// bucket.wait(&CallContext::new()).await?;
/// ```
#[derive(Clone)]
pub struct TokenBucket {
    limiter: Option<Arc<DirectRateLimiter>>,
    rate: f64,
    burst: u32,
}

impl TokenBucket {
    /// A bucket with infinite rate that admits every call immediately.
    pub fn unconstrained() -> Self {
        Self {
            limiter: None,
            rate: f64::INFINITY,
            burst: 0,
        }
    }

    /// A bucket refilling `rate` tokens per second, holding up to `burst`.
    ///
    /// Governor needs room for at least one token, so a zero burst still
    /// admits single calls at the refill rate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `rate` is not a positive finite
    /// number, or if its refill period is shorter than governor can express
    /// or longer than [`MAX_PERIOD`].
    #[instrument]
    pub fn new(rate: f64, burst: u32) -> PacerResult<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PacerError::new(PacerErrorKind::Configuration(format!(
                "token bucket rate must be positive and finite, got {}",
                rate
            ))));
        }

        let period = Duration::try_from_secs_f64(1.0 / rate)
            .ok()
            .filter(|period| *period <= MAX_PERIOD)
            .ok_or_else(|| {
                PacerError::new(PacerErrorKind::Configuration(format!(
                    "token bucket rate {} is too slow to pace",
                    rate
                )))
            })?;
        let quota = Quota::with_period(period).ok_or_else(|| {
            PacerError::new(PacerErrorKind::Configuration(format!(
                "token bucket rate {} is too fast to pace",
                rate
            )))
        })?;
        let capacity = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = quota.allow_burst(capacity);

        debug!(rate, burst, ?period, "Creating token bucket");
        Ok(Self {
            limiter: Some(Arc::new(GovernorRateLimiter::direct(quota))),
            rate,
            burst,
        })
    }

    /// Refill rate in tokens per second (infinite when unconstrained).
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Burst capacity the bucket was configured with.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// True for the pre-calibration bucket that never blocks.
    pub fn is_unconstrained(&self) -> bool {
        self.limiter.is_none()
    }

    /// Take a token without waiting.
    ///
    /// Returns false if the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::unconstrained()
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn wait(&self, ctx: &CallContext) -> PacerResult<()> {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        ctx.run(limiter.until_ready()).await
    }
}
