//! Pacer - resilient HTTP API controller
//!
//! Pacer issues outbound API calls under three constraints at once:
//!
//! - **Retries**: transport failures, 429 and 5xx responses are retried with
//!   bounded, jittered backoff
//! - **Rate limiting**: a token bucket paces requests; its capacity is read
//!   from the `X-RateLimit-Limit` header of the first response
//! - **Concurrency**: one [`Controller`] is shared by many tasks, and every
//!   wait races the call's [`CallContext`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pacer::{CallContext, Controller, Method, Operation, from_config, PacerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PacerConfig::load()?;
//!     let controller = Controller::new("api.example.com", [from_config(&config)])?;
//!
//!     let get_user = Operation::new(Method::GET, "users/{id}", "Fetch a single user");
//!     let user: serde_json::Value = controller
//!         .call(&CallContext::new(), &get_user, &[("id", "7")], None::<&()>)
//!         .await?;
//!     println!("{}", user);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `pacer_error` - error taxonomy and the response snapshot
//! - `pacer_rate_limit` - call context, token bucket and calibration
//! - `pacer` - controller, policies, transport and configuration
//!
//! This crate re-exports the other two for convenience.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod config;
mod controller;
mod handler;
mod operation;
mod options;
mod request;
mod retry;
mod sink;
mod transport;

pub use backoff::{
    Backoff, DefaultBackoff, SERVER_WAIT_MAX, SERVER_WAIT_MIN, linear_jitter_backoff,
    rate_limit_backoff,
};
pub use config::{PacerConfig, RetryConfig, TransportConfig};
pub use controller::Controller;
pub use handler::{DefaultErrorHandler, ErrorHandler, SUCCESS_STATUSES, is_success};
pub use operation::Operation;
pub use options::{
    ControllerOption, ControllerSettings, DEFAULT_RETRY_MAX, DEFAULT_WAIT_MAX, DEFAULT_WAIT_MIN,
    from_config, with_backoff, with_error_handler, with_limit_headers, with_limiter,
    with_retry_max, with_retry_policy, with_retry_wait, with_transport, with_transport_config,
    without_retries,
};
pub use request::{
    ApiRequest, FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, PathTemplate, build_request, carries_body,
    normalize_base_url,
};
pub use retry::{Attempt, DefaultRetryPolicy, RetryPolicy, is_retryable_status};
pub use sink::{Discard, Json, ResponseSink, Writer};
pub use transport::{ReqwestTransport, RetryingTransport, Transport};

pub use pacer_error::*;
pub use pacer_rate_limit::*;
pub use reqwest::{Method, StatusCode, Url};
