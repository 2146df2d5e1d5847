//! Turning unsuccessful responses into errors.

use pacer_error::{ApiResponse, PacerError, PacerErrorKind, PacerResult};
use reqwest::StatusCode;

/// Statuses that never reach the error handler.
pub const SUCCESS_STATUSES: [StatusCode; 5] = [
    StatusCode::OK,
    StatusCode::CREATED,
    StatusCode::ACCEPTED,
    StatusCode::NO_CONTENT,
    StatusCode::NOT_MODIFIED,
];

/// Whether `status` is treated as success by dispatch.
pub fn is_success(status: StatusCode) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// Inspects a final response whose status is not a success.
///
/// `response` carries the buffered body. Returning `Ok(())` lets dispatch
/// continue to decoding; an error is returned to the caller with the
/// response attached.
pub trait ErrorHandler: Send + Sync {
    /// Decide what an unsuccessful response means.
    fn handle(&self, response: &ApiResponse) -> PacerResult<()>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&ApiResponse) -> PacerResult<()> + Send + Sync,
{
    fn handle(&self, response: &ApiResponse) -> PacerResult<()> {
        self(response)
    }
}

/// Maps the status to `RateLimited`, `Server` or `Client` with the body as
/// message.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, response: &ApiResponse) -> PacerResult<()> {
        let status = response.status().as_u16();
        let mut message = response.text();
        if message.trim().is_empty() {
            message = response
                .status()
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string();
        }
        Err(PacerError::new(PacerErrorKind::from_status(status, message)))
    }
}
