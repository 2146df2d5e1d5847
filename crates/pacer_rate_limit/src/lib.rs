//! Rate limiting for outbound API calls.
//!
//! This crate provides the token bucket that paces a controller's requests.
//! The bucket starts unconstrained and is calibrated once from the limit the
//! server advertises in its response headers.
//!
//! ## Pieces
//!
//! - [`CallContext`] - per-call cancellation token and optional deadline
//! - [`RateLimiter`] - the waiting contract every limiter implements
//! - [`TokenBucket`] - default limiter backed by governor's GCRA
//! - [`Calibration`] - rate and burst derived from an advertised limit
//! - [`LimitHeaders`] - names of the limit and reset headers

mod calibration;
mod context;
mod headers;
mod limiter;

pub use calibration::{BURST_FACTOR, Calibration, RATE_FACTOR};
pub use context::CallContext;
pub use headers::{DEFAULT_LIMIT_HEADER, DEFAULT_RESET_HEADER, LimitHeaders};
pub use limiter::{MAX_PERIOD, RateLimiter, TokenBucket};
