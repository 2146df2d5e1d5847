//! Per-call cancellation and deadlines.

use pacer_error::{Cancellation, PacerResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation signal carried by every call.
///
/// Wraps a [`CancellationToken`] and an optional deadline. Every blocking
/// step of a call (limiter wait, backoff sleep, network I/O) races against
/// [`CallContext::done`], so cancelling the token or passing the deadline
/// aborts the call promptly with the matching [`Cancellation`].
///
/// Cloning shares the token: cancelling any clone cancels them all.
///
/// # Example
///
/// ```rust,ignore
/// let ctx = CallContext::with_timeout(Duration::from_secs(5));
/// let request = controller.build_request(&ctx, Method::GET, "users", None::<&()>)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose deadline passes `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context with an absolute deadline.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context driven by an existing token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context that is cancelled with this one and whose deadline
    /// is the earlier of this deadline and `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(current) => current.min(candidate),
            None => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<Cancellation> {
        if self.token.is_cancelled() {
            return Some(Cancellation::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Cancellation::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Cancellation {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Cancellation::Cancelled,
            _ = deadline => Cancellation::DeadlineExceeded,
        }
    }

    /// Drive `future` to completion unless the context finishes first.
    ///
    /// An already-finished context fails without polling `future` at all.
    pub async fn run<F>(&self, future: F) -> PacerResult<F::Output>
    where
        F: Future,
    {
        if let Some(reason) = self.err() {
            return Err(reason.into());
        }

        tokio::select! {
            biased;
            reason = self.done() => Err(reason.into()),
            output = future => Ok(output),
        }
    }
}
