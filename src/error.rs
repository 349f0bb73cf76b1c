//! Error kinds produced by the scheduling core.
//!
//! A plain enum rather than a derive-macro-backed error type: everything
//! here surfaces to userspace as a single `-1`, so there is nothing an
//! error-derive crate would buy.

/// Recoverable scheduler errors. Every variant surfaces to userspace as a
/// `-1` syscall result; none of these unwind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SchedError {
    /// No free process or thread slot.
    OutOfSlots,
    /// Stack or address-space allocation failed.
    OutOfMemory,
    /// Stride admission refused: non-positive request or capacity exceeded.
    ShareRefused,
    /// `kill`/`thread_join` target not found.
    NotFound,
}

impl SchedError {
    /// The syscall-boundary encoding used by every syscall handler.
    pub const fn as_retval(self) -> i64 {
        -1
    }
}

impl core::fmt::Display for SchedError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            SchedError::OutOfSlots => "no free slot",
            SchedError::OutOfMemory => "allocation failed",
            SchedError::ShareRefused => "stride share refused",
            SchedError::NotFound => "not found",
        };
        f.write_str(msg)
    }
}

pub type SchedResult<T> = Result<T, SchedError>;

/// Fatal scheduler conditions that never surface to userspace as a
/// `Result`. The scheduler lock is effectively poisoned once one of these
/// fires, so this panics rather than returning `Err`; a real kernel would
/// halt with a diagnostic in its place.
macro_rules! invariant_violation {
    ($($arg:tt)*) => {{
        panic!("invariant violation: {}", core::format_args!($($arg)*))
    }};
}
pub(crate) use invariant_violation;
