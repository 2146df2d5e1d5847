//! Retry classification.

use pacer_error::{ApiResponse, PacerError, PacerResult};
use pacer_rate_limit::CallContext;
use reqwest::StatusCode;

/// Outcome of a single attempt, as seen by the retry classifier.
#[derive(Debug, Clone, Copy)]
pub enum Attempt<'a> {
    /// A response arrived (any status)
    Response(&'a ApiResponse),
    /// No response: the exchange failed at the transport level
    Failed(&'a PacerError),
}

/// Decides whether an attempt should be retried.
///
/// Returning `Ok(true)` requests another attempt (subject to the retry cap),
/// `Ok(false)` makes the attempt final, and `Err` aborts the call with that
/// error.
pub trait RetryPolicy: Send + Sync {
    /// Classify one attempt.
    fn should_retry(&self, ctx: &CallContext, attempt: Attempt<'_>) -> PacerResult<bool>;
}

impl<F> RetryPolicy for F
where
    F: Fn(&CallContext, Attempt<'_>) -> PacerResult<bool> + Send + Sync,
{
    fn should_retry(&self, ctx: &CallContext, attempt: Attempt<'_>) -> PacerResult<bool> {
        self(ctx, attempt)
    }
}

/// Default classifier.
///
/// - cancelled or expired context: never retried, the cancellation surfaces
/// - transport failure: retried
/// - 429 and 5xx responses: retried
/// - anything else: final
///
/// With retries disabled only the cancellation check remains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultRetryPolicy {
    disabled: bool,
}

impl DefaultRetryPolicy {
    /// Classifier that retries eligible attempts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier that treats every attempt as final.
    pub fn disabled() -> Self {
        Self { disabled: true }
    }

    /// Whether retries are turned off.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, ctx: &CallContext, attempt: Attempt<'_>) -> PacerResult<bool> {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        match attempt {
            Attempt::Failed(err) if err.is_cancelled() => Err(err.clone()),
            Attempt::Failed(err) => Ok(!self.disabled && err.is_retryable()),
            Attempt::Response(response) => {
                Ok(!self.disabled && is_retryable_status(*response.status()))
            }
        }
    }
}

/// True for 429 Too Many Requests and every 5xx status.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_error::{Cancellation, PacerErrorKind};
    use reqwest::Url;
    use reqwest::header::HeaderMap;

    fn response(status: u16) -> ApiResponse {
        ApiResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Url::parse("https://api.example.com/").unwrap(),
            "",
        )
    }

    #[test]
    fn test_final_statuses() {
        let policy = DefaultRetryPolicy::new();
        let ctx = CallContext::new();
        for status in [200, 201, 202, 204, 304, 400, 401, 403, 404] {
            let response = response(status);
            assert!(
                !policy.should_retry(&ctx, Attempt::Response(&response)).unwrap(),
                "{status} should be final"
            );
        }
    }

    #[test]
    fn test_retryable_statuses() {
        let policy = DefaultRetryPolicy::new();
        let ctx = CallContext::new();
        for status in [429, 500, 502, 503, 504] {
            let response = response(status);
            assert!(
                policy.should_retry(&ctx, Attempt::Response(&response)).unwrap(),
                "{status} should be retried"
            );
        }
    }

    #[test]
    fn test_transport_failures_retry() {
        let policy = DefaultRetryPolicy::new();
        let err = PacerError::new(PacerErrorKind::Transport("connection reset".to_string()));
        assert!(policy.should_retry(&CallContext::new(), Attempt::Failed(&err)).unwrap());
    }

    #[test]
    fn test_disabled_never_retries() {
        let policy = DefaultRetryPolicy::disabled();
        let ctx = CallContext::new();
        let err = PacerError::new(PacerErrorKind::Transport("connection reset".to_string()));
        assert!(!policy.should_retry(&ctx, Attempt::Failed(&err)).unwrap());
        for status in [429, 500, 503] {
            let response = response(status);
            assert!(!policy.should_retry(&ctx, Attempt::Response(&response)).unwrap());
        }
    }

    #[test]
    fn test_cancelled_context_surfaces_cancellation() {
        let policy = DefaultRetryPolicy::new();
        let ctx = CallContext::new();
        ctx.cancel();

        let response = response(503);
        let err = policy
            .should_retry(&ctx, Attempt::Response(&response))
            .unwrap_err();
        assert_eq!(err.kind(), &PacerErrorKind::Cancelled(Cancellation::Cancelled));
    }

    #[test]
    fn test_cancelled_attempt_is_not_retried() {
        let policy = DefaultRetryPolicy::new();
        let err = PacerError::new(PacerErrorKind::Cancelled(Cancellation::DeadlineExceeded));
        let surfaced = policy
            .should_retry(&CallContext::new(), Attempt::Failed(&err))
            .unwrap_err();
        assert!(surfaced.is_cancelled());
    }
}
