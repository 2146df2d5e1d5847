//! Top-level error types.

use crate::{ApiResponse, Cancellation};

/// Pacer error conditions.
///
/// # Examples
///
/// ```
/// use pacer_error::PacerErrorKind;
///
/// let kind = PacerErrorKind::from_status(503, "maintenance");
/// assert!(kind.is_retryable());
/// assert!(format!("{}", kind).contains("503"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum PacerErrorKind {
    /// Bad base address or a rejected construction option
    #[display("Configuration error: {}", _0)]
    Configuration(String),
    /// The call's context was cancelled or its deadline passed
    #[display("Cancelled: {}", _0)]
    Cancelled(Cancellation),
    /// Connection-level failure before any response arrived
    #[display("Transport error: {}", _0)]
    Transport(String),
    /// The server answered 429 Too Many Requests
    #[display("HTTP {} rate limited: {}", status, message)]
    RateLimited {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },
    /// The server answered with a 5xx status
    #[display("HTTP {} server error: {}", status, message)]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },
    /// The server rejected the request with a 4xx status other than 429
    #[display("HTTP {} client error: {}", status, message)]
    Client {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },
    /// Payload serialization or path unescaping failed
    #[display("Encoding error: {}", _0)]
    Encoding(String),
    /// Response body could not be decoded
    #[display("Decode error: {}", _0)]
    Decode(String),
    /// Free-form error produced by a custom error handler
    #[display("{}", _0)]
    Handler(String),
}

impl PacerErrorKind {
    /// Classify an unsuccessful status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => PacerErrorKind::RateLimited { status, message },
            500.. => PacerErrorKind::Server { status, message },
            _ => PacerErrorKind::Client { status, message },
        }
    }

    /// Check if this error type is eligible for another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PacerErrorKind::Transport(_)
                | PacerErrorKind::RateLimited { .. }
                | PacerErrorKind::Server { .. }
        )
    }

    /// HTTP status carried by a status error.
    pub fn status(&self) -> Option<u16> {
        match self {
            PacerErrorKind::RateLimited { status, .. }
            | PacerErrorKind::Server { status, .. }
            | PacerErrorKind::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<Cancellation> for PacerErrorKind {
    fn from(reason: Cancellation) -> Self {
        PacerErrorKind::Cancelled(reason)
    }
}

impl From<reqwest::Error> for PacerErrorKind {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PacerErrorKind::Decode(err.to_string())
        } else if err.is_builder() {
            PacerErrorKind::Encoding(err.to_string())
        } else {
            PacerErrorKind::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PacerErrorKind {
    fn from(err: serde_json::Error) -> Self {
        PacerErrorKind::Decode(err.to_string())
    }
}

/// Pacer error with source location tracking.
///
/// Status and decode errors keep the response that produced them, reachable
/// through [`PacerError::response`].
///
/// # Examples
///
/// ```
/// use pacer_error::{Cancellation, PacerError, PacerErrorKind};
///
/// let err = PacerError::new(PacerErrorKind::Cancelled(Cancellation::DeadlineExceeded));
/// assert!(err.is_cancelled());
/// assert!(err.response().is_none());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Pacer Error: {} at line {} in {}", kind, line, file)]
pub struct PacerError {
    kind: PacerErrorKind,
    response: Option<Box<ApiResponse>>,
    line: u32,
    file: &'static str,
}

impl PacerError {
    /// Create a new error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: PacerErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            response: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Attach the response that caused this error.
    pub fn with_response(mut self, response: ApiResponse) -> Self {
        self.response = Some(Box::new(response));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> &PacerErrorKind {
        &self.kind
    }

    /// The response received before the failure, if any.
    pub fn response(&self) -> Option<&ApiResponse> {
        self.response.as_deref()
    }

    /// Detach the response from the error.
    pub fn into_response(self) -> Option<ApiResponse> {
        self.response.map(|response| *response)
    }

    /// Line where the error was created.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// File where the error was created.
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// True when the call was cancelled or ran past its deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, PacerErrorKind::Cancelled(_))
    }

    /// True for transport failures, 429 and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// HTTP status of the attached response or status error.
    pub fn status(&self) -> Option<u16> {
        self.response
            .as_ref()
            .map(|response| response.status().as_u16())
            .or_else(|| self.kind.status())
    }
}

// Generic From implementation for any type that converts to PacerErrorKind
impl<T> From<T> for PacerError
where
    T: Into<PacerErrorKind>,
{
    #[track_caller]
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Pacer operations.
pub type PacerResult<T> = std::result::Result<T, PacerError>;
