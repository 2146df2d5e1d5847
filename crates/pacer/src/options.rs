//! Construction-time options for [`Controller`](crate::Controller).
//!
//! Each option is a small mutator over [`ControllerSettings`]. Options are
//! applied in order and the first failing option aborts construction.
//!
//! ```rust,ignore
//! let controller = Controller::new(
//!     "api.example.com",
//!     [with_retry_max(3), with_retry_wait(min, max)],
//! )?;
//! ```

use crate::backoff::{Backoff, DefaultBackoff};
use crate::config::{PacerConfig, TransportConfig};
use crate::handler::{DefaultErrorHandler, ErrorHandler};
use crate::retry::{DefaultRetryPolicy, RetryPolicy};
use crate::transport::{ReqwestTransport, Transport};
use pacer_error::{PacerError, PacerErrorKind, PacerResult};
use pacer_rate_limit::{LimitHeaders, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

/// Retries after the first attempt unless configured otherwise.
pub const DEFAULT_RETRY_MAX: usize = 5;

/// Default lower bound handed to the backoff policy.
pub const DEFAULT_WAIT_MIN: Duration = Duration::from_millis(100);

/// Default upper bound handed to the backoff policy.
pub const DEFAULT_WAIT_MAX: Duration = Duration::from_millis(400);

/// A construction-time mutator.
pub type ControllerOption = Box<dyn FnOnce(&mut ControllerSettings) -> PacerResult<()> + Send>;

/// Everything a controller is built from.
///
/// Unset policies fall back to their defaults when the controller is built.
pub struct ControllerSettings {
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) transport_config: TransportConfig,
    pub(crate) backoff: Option<Arc<dyn Backoff>>,
    pub(crate) retry_policy: Option<Arc<dyn RetryPolicy>>,
    pub(crate) limiter: Option<Arc<dyn RateLimiter>>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) limit_headers: LimitHeaders,
    pub(crate) retry_max: usize,
    pub(crate) wait_min: Duration,
    pub(crate) wait_max: Duration,
    pub(crate) server_wait: Option<(Duration, Duration)>,
    pub(crate) retries_disabled: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            transport: None,
            transport_config: TransportConfig::default(),
            backoff: None,
            retry_policy: None,
            limiter: None,
            error_handler: Arc::new(DefaultErrorHandler),
            limit_headers: LimitHeaders::default(),
            retry_max: DEFAULT_RETRY_MAX,
            wait_min: DEFAULT_WAIT_MIN,
            wait_max: DEFAULT_WAIT_MAX,
            server_wait: None,
            retries_disabled: false,
        }
    }
}

impl ControllerSettings {
    /// Maximum number of retries.
    pub fn retry_max(&self) -> usize {
        self.retry_max
    }

    /// Backoff bounds.
    pub fn retry_wait(&self) -> (Duration, Duration) {
        (self.wait_min, self.wait_max)
    }

    /// Whether the default classifier has been switched off.
    pub fn retries_disabled(&self) -> bool {
        self.retries_disabled
    }

    /// Whether a custom limiter was supplied.
    pub fn has_custom_limiter(&self) -> bool {
        self.limiter.is_some()
    }

    /// Rate limit header names.
    pub fn limit_headers(&self) -> &LimitHeaders {
        &self.limit_headers
    }

    pub(crate) fn take_transport(&mut self) -> Arc<dyn Transport> {
        self.transport
            .take()
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new(self.transport_config.clone())))
    }

    pub(crate) fn take_backoff(&mut self) -> Arc<dyn Backoff> {
        self.backoff.take().unwrap_or_else(|| {
            let backoff = DefaultBackoff::new(self.limit_headers.clone());
            match self.server_wait {
                Some((min, max)) => Arc::new(backoff.with_server_window(min, max)),
                None => Arc::new(backoff),
            }
        })
    }

    pub(crate) fn take_retry_policy(&mut self) -> Arc<dyn RetryPolicy> {
        self.retry_policy.take().unwrap_or_else(|| {
            if self.retries_disabled {
                Arc::new(DefaultRetryPolicy::disabled())
            } else {
                Arc::new(DefaultRetryPolicy::new())
            }
        })
    }
}

impl std::fmt::Debug for ControllerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerSettings")
            .field("transport_config", &self.transport_config)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_backoff", &self.backoff.is_some())
            .field("custom_retry_policy", &self.retry_policy.is_some())
            .field("custom_limiter", &self.limiter.is_some())
            .field("limit_headers", &self.limit_headers)
            .field("retry_max", &self.retry_max)
            .field("wait_min", &self.wait_min)
            .field("wait_max", &self.wait_max)
            .field("retries_disabled", &self.retries_disabled)
            .finish_non_exhaustive()
    }
}

/// Replace the backoff policy.
pub fn with_backoff(backoff: impl Backoff + 'static) -> ControllerOption {
    Box::new(move |settings| {
        settings.backoff = Some(Arc::new(backoff));
        Ok(())
    })
}

/// Replace the retry classifier.
pub fn with_retry_policy(policy: impl RetryPolicy + 'static) -> ControllerOption {
    Box::new(move |settings| {
        settings.retry_policy = Some(Arc::new(policy));
        Ok(())
    })
}

/// Use a custom limiter.
///
/// A custom limiter is never replaced by header calibration.
pub fn with_limiter(limiter: impl RateLimiter + 'static) -> ControllerOption {
    Box::new(move |settings| {
        settings.limiter = Some(Arc::new(limiter));
        Ok(())
    })
}

/// Replace the HTTP transport.
pub fn with_transport(transport: impl Transport + 'static) -> ControllerOption {
    Box::new(move |settings| {
        settings.transport = Some(Arc::new(transport));
        Ok(())
    })
}

/// Settings for the default pooled transport.
pub fn with_transport_config(config: TransportConfig) -> ControllerOption {
    Box::new(move |settings| {
        settings.transport_config = config;
        Ok(())
    })
}

/// Maximum number of retries after the first attempt.
pub fn with_retry_max(retry_max: usize) -> ControllerOption {
    Box::new(move |settings| {
        settings.retry_max = retry_max;
        Ok(())
    })
}

/// Bounds handed to the backoff policy.
///
/// # Errors
///
/// Fails construction if `min` exceeds `max`.
pub fn with_retry_wait(min: Duration, max: Duration) -> ControllerOption {
    Box::new(move |settings| {
        if min > max {
            return Err(PacerError::new(PacerErrorKind::Configuration(format!(
                "Minimum retry wait {:?} exceeds maximum {:?}",
                min, max
            ))));
        }
        settings.wait_min = min;
        settings.wait_max = max;
        Ok(())
    })
}

/// Replace the handler for unsuccessful responses.
pub fn with_error_handler(handler: impl ErrorHandler + 'static) -> ControllerOption {
    Box::new(move |settings| {
        settings.error_handler = Arc::new(handler);
        Ok(())
    })
}

/// Switch off the default retry classifier.
///
/// Has no effect on a custom policy from [`with_retry_policy`].
pub fn without_retries() -> ControllerOption {
    Box::new(|settings| {
        settings.retries_disabled = true;
        Ok(())
    })
}

/// Read the limit and reset timestamps from other headers.
pub fn with_limit_headers(headers: LimitHeaders) -> ControllerOption {
    Box::new(move |settings| {
        settings.limit_headers = headers;
        Ok(())
    })
}

/// Apply everything a [`PacerConfig`] describes.
///
/// # Errors
///
/// Fails construction if the retry window is inverted.
pub fn from_config(config: &PacerConfig) -> ControllerOption {
    let config = config.clone();
    Box::new(move |settings| {
        let (min, max) = config.retry.wait();
        with_retry_wait(min, max)(settings)?;

        let (server_min, server_max) = config.retry.server_wait();
        if server_min > server_max {
            return Err(PacerError::new(PacerErrorKind::Configuration(format!(
                "Minimum server wait {:?} exceeds maximum {:?}",
                server_min, server_max
            ))));
        }

        settings.server_wait = Some((server_min, server_max));
        settings.retry_max = config.retry.max_retries;
        settings.retries_disabled = config.retry.disabled;
        settings.limit_headers = config.rate_limit;
        settings.transport_config = config.transport;
        Ok(())
    })
}
