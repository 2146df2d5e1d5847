//! Error types for the Pacer controller.
//!
//! This crate provides the error taxonomy shared by every Pacer crate.
//!
//! # Error Hierarchy
//!
//! Errors follow the `ErrorKind` + wrapper struct pattern:
//! - [`PacerErrorKind`] names the failure (configuration, cancellation,
//!   transport, status, encoding, decoding)
//! - [`PacerError`] wraps the kind with source location tracking and, where
//!   one was received, the [`ApiResponse`] that caused it
//! - Constructors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use pacer_error::{PacerErrorKind, PacerResult};
//!
//! fn connect() -> PacerResult<()> {
//!     Err(PacerErrorKind::Transport("connection refused".to_string()))?
//! }
//!
//! let err = connect().unwrap_err();
//! assert!(err.is_retryable());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cancellation;
mod error;
mod response;

pub use cancellation::Cancellation;
pub use error::{PacerError, PacerErrorKind, PacerResult};
pub use response::ApiResponse;
