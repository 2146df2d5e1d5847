//! The request controller.
//!
//! A [`Controller`] is built once and shared by every caller. Each dispatch
//! runs through the same steps:
//!
//! 1. wait for a token from the current limiter
//! 2. send through the retrying transport
//! 3. on the very first response, calibrate the limiter from its headers
//! 4. hand unsuccessful statuses to the error handler
//! 5. decode the body into the caller's sink

use crate::handler::{ErrorHandler, is_success};
use crate::operation::Operation;
use crate::options::{ControllerOption, ControllerSettings};
use crate::request::{ApiRequest, build_request, normalize_base_url};
use crate::sink::{Json, ResponseSink};
use crate::transport::RetryingTransport;
use pacer_error::{ApiResponse, PacerError, PacerErrorKind, PacerResult};
use pacer_rate_limit::{CallContext, Calibration, LimitHeaders, RateLimiter, TokenBucket};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

/// Resilient HTTP API controller.
///
/// Safe to share between tasks (wrap it in an `Arc`). The limiter starts
/// unconstrained and is replaced at most once, from the rate limit header of
/// the first response any caller receives.
///
/// # Example
///
/// ```rust,ignore
/// use pacer::{CallContext, Controller, Method, with_retry_max};
///
/// let controller = Controller::new("api.example.com", [with_retry_max(3)])?;
/// let ctx = CallContext::new();
/// let request = controller.build_request(&ctx, Method::GET, "users", Some(&[("limit", 5)]))?;
/// let (response, users): (_, Vec<User>) = controller.dispatch_json(&request).await?;
/// ```
pub struct Controller {
    base_url: Url,
    transport: RetryingTransport,
    limiter: RwLock<Arc<dyn RateLimiter>>,
    calibrated: AtomicBool,
    calibration: OnceLock<Calibration>,
    limit_headers: LimitHeaders,
    error_handler: Arc<dyn ErrorHandler>,
}

impl Controller {
    /// Build a controller for `base_url`.
    ///
    /// A bare host gets the `https` scheme and the base path always ends in
    /// `/`. Options are applied in order.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the base URL does not parse, or
    /// the first error returned by an option.
    #[instrument(name = "controller_new", skip(options))]
    pub fn new<I>(base_url: &str, options: I) -> PacerResult<Self>
    where
        I: IntoIterator<Item = ControllerOption>,
    {
        let base_url = normalize_base_url(base_url)?;

        let mut settings = ControllerSettings::default();
        for option in options {
            option(&mut settings)?;
        }
        debug!(?settings, "Applied controller options");

        let custom_limiter = settings.limiter.take();
        let calibrated = custom_limiter.is_some();
        let limiter: Arc<dyn RateLimiter> =
            custom_limiter.unwrap_or_else(|| Arc::new(TokenBucket::unconstrained()));

        let transport = RetryingTransport::new(
            settings.take_transport(),
            settings.take_backoff(),
            settings.take_retry_policy(),
            settings.retry_max,
            (settings.wait_min, settings.wait_max),
        );

        info!(base_url = %base_url, custom_limiter = calibrated, "Controller ready");

        Ok(Self {
            base_url,
            transport,
            limiter: RwLock::new(limiter),
            calibrated: AtomicBool::new(calibrated),
            calibration: OnceLock::new(),
            limit_headers: settings.limit_headers,
            error_handler: settings.error_handler,
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the limiter can no longer be replaced.
    ///
    /// True after the first response, or from the start with a custom limiter.
    pub fn is_calibrated(&self) -> bool {
        self.calibrated.load(Ordering::Acquire)
    }

    /// Settings derived from the first response, if it advertised a usable
    /// limit.
    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration.get().copied()
    }

    /// The limiter subsequent calls wait on.
    pub fn limiter(&self) -> Arc<dyn RateLimiter> {
        self.limiter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The retrying transport.
    pub fn transport(&self) -> &RetryingTransport {
        &self.transport
    }

    /// Build a request for `path` relative to the base URL.
    ///
    /// See [`build_request`] for the encoding rules.
    pub fn build_request<T>(
        &self,
        ctx: &CallContext,
        method: Method,
        path: &str,
        payload: Option<&T>,
    ) -> PacerResult<ApiRequest>
    where
        T: Serialize + ?Sized,
    {
        build_request(&self.base_url, ctx, method, path, payload)
    }

    /// Send `request` and decode its body into `sink`.
    ///
    /// Returns the final response. Statuses other than 200, 201, 202, 204
    /// and 304 go to the error handler with the body buffered; its error is
    /// returned with the response attached. Decode failures also carry the
    /// response.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if the request's context finishes first; with an
    ///   already-cancelled context nothing is sent
    /// - `Transport` once retries are exhausted without a response, or when
    ///   the body of an unsuccessful response cannot be read
    /// - whatever the error handler returns for unsuccessful statuses
    /// - `Decode` if the sink rejects the body
    #[instrument(
        name = "dispatch",
        skip(self, request, sink),
        fields(
            http.method = %request.method(),
            http.url = %request.url(),
            http.status_code = tracing::field::Empty,
        )
    )]
    pub async fn dispatch(
        &self,
        request: &ApiRequest,
        sink: &mut dyn ResponseSink,
    ) -> PacerResult<ApiResponse> {
        let ctx = request.context();

        let limiter = self.limiter();
        limiter.wait(ctx).await?;

        let response = self.transport.send(ctx, request).await?;
        let head = ApiResponse::from_head(&response);
        tracing::Span::current().record("http.status_code", head.status().as_u16());

        self.calibrate(ctx, head.headers()).await;

        if !is_success(*head.status()) {
            let body = match ctx.run(response.bytes()).await? {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "Failed to read error response body");
                    return Err(PacerError::new(PacerErrorKind::Transport(format!(
                        "Failed to read response body: {}",
                        e
                    )))
                    .with_response(head));
                }
            };
            let snapshot = head.with_body(body);

            if let Err(err) = self.error_handler.handle(&snapshot) {
                debug!(error = %err, "Error handler rejected response");
                return Err(err.with_response(snapshot));
            }

            return match sink.consume_buffered(snapshot.body().clone()).await {
                Ok(()) => Ok(snapshot),
                Err(err) => Err(err.with_response(snapshot)),
            };
        }

        match ctx.run(sink.consume(response)).await.and_then(|result| result) {
            Ok(()) => Ok(head),
            Err(err) => Err(err.with_response(head)),
        }
    }

    /// Dispatch and decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Same as [`dispatch`](Self::dispatch).
    pub async fn dispatch_json<T>(&self, request: &ApiRequest) -> PacerResult<(ApiResponse, T)>
    where
        T: DeserializeOwned + Send,
    {
        let mut sink = Json::<T>::new();
        let response = self.dispatch(request, &mut sink).await?;
        match sink.into_inner() {
            Some(value) => Ok((response, value)),
            None => Err(PacerError::new(PacerErrorKind::Decode(
                "Response body was not decoded".to_string(),
            ))
            .with_response(response)),
        }
    }

    /// Invoke `operation`, filling its path placeholders from `params`.
    ///
    /// # Errors
    ///
    /// `Encoding` if a placeholder has no value or `body` cannot be
    /// serialized; otherwise as [`dispatch`](Self::dispatch).
    #[instrument(
        name = "call",
        skip(self, ctx, operation, params, body),
        fields(operation = %operation)
    )]
    pub async fn call<Req, Resp>(
        &self,
        ctx: &CallContext,
        operation: &Operation,
        params: &[(&str, &str)],
        body: Option<&Req>,
    ) -> PacerResult<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned + Send,
    {
        let path = operation.path().expand(params)?;
        let request = self.build_request(ctx, operation.method().clone(), &path, body)?;
        let (_, value) = self.dispatch_json(&request).await?;
        Ok(value)
    }

    /// Release pooled idle connections.
    ///
    /// Safe to call more than once. In-flight requests are not cancelled.
    pub fn shutdown(&self) {
        debug!("Shutting down controller transport");
        self.transport.transport().close_idle_connections();
    }

    /// Replace the limiter from the first response, at most once.
    ///
    /// Only one caller wins the flag; everyone else returns at once. An
    /// absent or unusable header leaves the limiter unconstrained.
    async fn calibrate(&self, ctx: &CallContext, headers: &HeaderMap) {
        if self
            .calibrated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let Some(calibration) = Calibration::from_headers(headers, &self.limit_headers) else {
            debug!("No usable rate limit header, limiter stays unconstrained");
            return;
        };

        let bucket = match calibration.bucket() {
            Ok(bucket) => Arc::new(bucket),
            Err(e) => {
                warn!(error = %e, "Rate limit calibration failed, limiter stays unconstrained");
                return;
            }
        };

        {
            let mut current = self.limiter.write().unwrap_or_else(PoisonError::into_inner);
            *current = bucket.clone();
        }
        let _ = self.calibration.set(calibration);

        info!(
            limit_per_minute = calibration.limit_per_minute(),
            rate = calibration.rate(),
            burst = calibration.burst(),
            "Calibrated rate limiter from response headers"
        );

        // Account for the request that carried the header
        if let Err(e) = bucket.wait(ctx).await {
            debug!(error = %e, "Interrupted while taking the calibration token");
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("base_url", &self.base_url.as_str())
            .field("transport", &self.transport)
            .field("calibrated", &self.is_calibrated())
            .field("calibration", &self.calibration())
            .finish_non_exhaustive()
    }
}
