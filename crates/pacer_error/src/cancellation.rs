//! Cancellation reasons.

/// Why a call stopped before it finished.
///
/// Distinguishes an explicit cancel from an expired deadline so callers can
/// tell a user abort apart from a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Cancellation {
    /// The call's cancellation token fired.
    #[display("context canceled")]
    Cancelled,
    /// The call's deadline passed.
    #[display("context deadline exceeded")]
    DeadlineExceeded,
}
