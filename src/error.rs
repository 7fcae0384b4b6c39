//! Top-level error types.
//!
//! Guest-visible failures never use these: a failed bridge call returns a
//! negative MINIX errno (`i16`) that flows straight into a reply message.
//! `CoreError` is only for the handful of failures that abort the whole
//! process before (or instead of) ever running guest code: a bad
//! invocation, an unreadable or malformed executable, or a host I/O error
//! encountered outside of a translated syscall.

use std::io;

/// Exit code used for usage errors, matching BSD `sysexits.h` `EX_USAGE`.
pub const EX_USAGE: i32 = 64;
/// Exit code used for OS-level startup errors, matching `EX_OSERR`.
pub const EX_OSERR: i32 = 71;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("not executable: {0}")]
    NotExecutable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// The process exit code this error should produce when it aborts
    /// startup, per `spec.md` §6 ("Exit code is the guest exit status (or
    /// `EX_USAGE`/`EX_OSERR` for pre-exec errors)").
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Usage(_) => EX_USAGE,
            CoreError::NotExecutable(_) | CoreError::Io(_) => EX_OSERR,
        }
    }
}

/// Logs `message` at `error` level and terminates the current control flow
/// immediately via panic.
///
/// Used exclusively for invariant violations (`spec.md` §7): out-of-range
/// RAM access, a write aimed at a directory FD, an illegal execution-state
/// transition. These indicate a bug in the guest image or in this crate,
/// never an expected condition, so there is no recovery path; `main` does
/// not catch this panic, so the process exits non-zero.
#[track_caller]
pub fn bug(message: impl AsRef<str>) -> ! {
    log::error!("invariant violation: {}", message.as_ref());
    panic!("invariant violation: {}", message.as_ref());
}
