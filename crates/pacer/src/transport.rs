//! HTTP transport and the retry loop around it.

use crate::backoff::Backoff;
use crate::config::TransportConfig;
use crate::request::ApiRequest;
use crate::retry::{Attempt, RetryPolicy};
use async_trait::async_trait;
use pacer_error::{ApiResponse, PacerError, PacerErrorKind, PacerResult};
use pacer_rate_limit::CallContext;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, instrument, warn};

/// Executes single HTTP exchanges.
///
/// Implementations must be safe to share across concurrent callers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the response head and streaming body.
    async fn execute(&self, request: reqwest::Request) -> PacerResult<reqwest::Response>;

    /// Release pooled idle connections. Must not disturb in-flight requests.
    fn close_idle_connections(&self) {}
}

/// Transport backed by a pooled `reqwest::Client`.
///
/// The client is built lazily from [`TransportConfig`].
/// [`close_idle_connections`](Transport::close_idle_connections) drops the
/// pooled client; requests already in flight hold their own handle and finish
/// normally, and the next request builds a fresh pool.
pub struct ReqwestTransport {
    config: TransportConfig,
    client: Mutex<Option<reqwest::Client>>,
}

impl ReqwestTransport {
    /// Transport configured from `config`.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    /// The settings used to build the client.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn client(&self) -> PacerResult<reqwest::Client> {
        let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = self.build_client()?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn build_client(&self) -> PacerResult<reqwest::Client> {
        debug!(config = ?self.config, "Building pooled HTTP client");

        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(self.config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host);
        if self.config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(self.config.timeout_secs));
        }
        if self.config.connect_timeout_secs > 0 {
            builder = builder.connect_timeout(Duration::from_secs(self.config.connect_timeout_secs));
        }
        if let Some(user_agent) = &self.config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        builder.build().map_err(|e| {
            PacerError::new(PacerErrorKind::Configuration(format!(
                "Failed to build HTTP client: {}",
                e
            )))
        })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pooled = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("ReqwestTransport")
            .field("config", &self.config)
            .field("pooled", &pooled)
            .finish()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: reqwest::Request) -> PacerResult<reqwest::Response> {
        let client = self.client()?;
        Ok(client.execute(request).await?)
    }

    fn close_idle_connections(&self) {
        let dropped = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(had_pool = dropped.is_some(), "Closing idle connections");
    }
}

/// Why an attempt did not produce a final response.
#[derive(Debug)]
enum Failure {
    /// A retry-eligible response; surfaced as-is once retries run out
    Response(reqwest::Response),
    /// A transport failure or an abort requested by the classifier
    Error(PacerError),
}

/// Transport that retries eligible attempts with backoff.
///
/// Runs attempt 0 and up to `retry_max` retries. After each attempt the
/// [`RetryPolicy`] decides; a retry sleeps for the [`Backoff`] delay of the
/// attempt that just failed, handed to the retry strategy. Every exchange
/// and every sleep races the call's [`CallContext`].
pub struct RetryingTransport {
    transport: Arc<dyn Transport>,
    backoff: Arc<dyn Backoff>,
    retry_policy: Arc<dyn RetryPolicy>,
    retry_max: usize,
    wait_min: Duration,
    wait_max: Duration,
}

impl RetryingTransport {
    /// Wrap `transport` with the given policies.
    pub fn new(
        transport: Arc<dyn Transport>,
        backoff: Arc<dyn Backoff>,
        retry_policy: Arc<dyn RetryPolicy>,
        retry_max: usize,
        wait: (Duration, Duration),
    ) -> Self {
        Self {
            transport,
            backoff,
            retry_policy,
            retry_max,
            wait_min: wait.0,
            wait_max: wait.1,
        }
    }

    /// Maximum number of retries after the first attempt.
    pub fn retry_max(&self) -> usize {
        self.retry_max
    }

    /// Bounds handed to the backoff policy.
    pub fn wait_bounds(&self) -> (Duration, Duration) {
        (self.wait_min, self.wait_max)
    }

    /// The underlying single-shot transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Send `request`, retrying as the policies allow.
    ///
    /// Returns the final response whatever its status: a 429 or 5xx that
    /// exhausted the retries is returned, not turned into an error. Fails
    /// with the last transport error, or with `Cancelled` if the context
    /// finishes first.
    #[instrument(
        name = "retrying_send",
        skip(self, ctx, request),
        fields(retry_max = self.retry_max)
    )]
    pub async fn send(
        &self,
        ctx: &CallContext,
        request: &ApiRequest,
    ) -> PacerResult<reqwest::Response> {
        let attempts = &AtomicU32::new(0);
        // Written by each failed attempt, read by the strategy before it sleeps
        let next_delay = &AtomicU64::new(0);
        let strategy = std::iter::from_fn(move || {
            Some(Duration::from_nanos(next_delay.load(Ordering::Acquire)))
        })
        .take(self.retry_max);

        let retried = Retry::spawn(strategy, move || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            self.attempt(ctx, request, attempt, next_delay)
        });

        match ctx.run(retried).await? {
            Ok(response) => Ok(response),
            Err(Failure::Response(response)) => {
                warn!(
                    status = response.status().as_u16(),
                    "Retries exhausted, surfacing last response"
                );
                Ok(response)
            }
            Err(Failure::Error(err)) => Err(err),
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        attempt as usize >= self.retry_max
    }

    async fn attempt(
        &self,
        ctx: &CallContext,
        request: &ApiRequest,
        attempt: u32,
        next_delay: &AtomicU64,
    ) -> Result<reqwest::Response, RetryError<Failure>> {
        let outcome = ctx
            .run(self.transport.execute(request.to_reqwest()))
            .await
            .and_then(|result| result);

        match outcome {
            Ok(response) => {
                let head = ApiResponse::from_head(&response);
                match self.retry_policy.should_retry(ctx, Attempt::Response(&head)) {
                    Ok(false) => Ok(response),
                    Ok(true) if self.exhausted(attempt) => {
                        Err(RetryError::Permanent(Failure::Response(response)))
                    }
                    Ok(true) => {
                        let wait = self.backoff.backoff(
                            self.wait_min,
                            self.wait_max,
                            attempt + 1,
                            Some(&head),
                        );
                        warn!(
                            attempt,
                            status = head.status().as_u16(),
                            wait_ms = wait.as_millis() as u64,
                            "Retryable response, backing off"
                        );
                        store_delay(next_delay, wait);
                        Err(RetryError::Transient {
                            err: Failure::Response(response),
                            retry_after: None,
                        })
                    }
                    Err(abort) => Err(RetryError::Permanent(Failure::Error(abort))),
                }
            }
            Err(err) => match self.retry_policy.should_retry(ctx, Attempt::Failed(&err)) {
                Ok(true) if self.exhausted(attempt) => {
                    debug!(attempt, error = %err, "Retries exhausted");
                    Err(RetryError::Permanent(Failure::Error(err)))
                }
                Ok(true) => {
                    let wait = self
                        .backoff
                        .backoff(self.wait_min, self.wait_max, attempt + 1, None);
                    warn!(
                        attempt,
                        error = %err,
                        wait_ms = wait.as_millis() as u64,
                        "Transport failure, backing off"
                    );
                    store_delay(next_delay, wait);
                    Err(RetryError::Transient {
                        err: Failure::Error(err),
                        retry_after: None,
                    })
                }
                Ok(false) => {
                    debug!(attempt, error = %err, "Transport failure is final");
                    Err(RetryError::Permanent(Failure::Error(err)))
                }
                Err(abort) => Err(RetryError::Permanent(Failure::Error(abort))),
            },
        }
    }
}

fn store_delay(slot: &AtomicU64, wait: Duration) {
    let nanos = u64::try_from(wait.as_nanos()).unwrap_or(u64::MAX);
    slot.store(nanos, Ordering::Release);
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("retry_max", &self.retry_max)
            .field("wait_min", &self.wait_min)
            .field("wait_max", &self.wait_max)
            .finish_non_exhaustive()
    }
}
