//! # Signal Handler Table & Host Signal Plumbing
//!
//! MINIX 1.5 has sixteen signals, numbered 1..16. Each has a slot in this
//! table holding the guest-side handler: a guest function pointer, or one
//! of two sentinels, default (`0x0000_0000`) or ignore (`0x0000_0001`)
//! (`spec.md` §3).
//!
//! Installing a handler other than a sentinel does *not* let the host
//! signal handler call back into the guest directly — the host signal
//! context cannot safely touch the emulator or guest RAM. Instead the host
//! trampoline only records "signal `n` is pending" in a process-wide
//! atomic, and the run loop delivers it on the guest's own stack between
//! emulator quanta (`spec.md` §4.5, §5).

use std::sync::atomic::{AtomicI32, Ordering};

pub const SIGNAL_COUNT: usize = 16;

/// Guest-side sentinel meaning "default action".
pub const HANDLER_DFL: u32 = 0x0000_0000;
/// Guest-side sentinel meaning "ignore this signal".
pub const HANDLER_IGN: u32 = 0x0000_0001;
/// Guest-side sentinel returned on error from `signal()`.
pub const HANDLER_ERR: u32 = 0xFFFF_FFFF;

/// No signal pending.
const NO_SIGNAL: i32 = 0;

/// Written only from host signal-handler context (async-signal-safe);
/// drained by the run loop between quanta. This is the one piece of
/// process state this crate keeps outside the explicit `MinixEnv`, because
/// a signal handler cannot be handed a `&mut MinixEnv` (`spec.md` §9).
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(NO_SIGNAL);

/// Host trampoline installed for any guest signal whose handler is
/// neither DFL nor IGN. Must do nothing beyond recording the signal
/// number: no allocation, no locking, no guest access.
extern "C" fn trampoline(signum: libc::c_int) {
    PENDING_SIGNAL.store(signum, Ordering::SeqCst);
}

/// Drains and returns the most recently recorded pending host signal
/// number, if any. Delivery order between two signals that arrive in the
/// same quantum is unspecified, per `spec.md` §5 ("last-writer wins").
pub fn take_pending_host_signal() -> Option<i32> {
    match PENDING_SIGNAL.swap(NO_SIGNAL, Ordering::SeqCst) {
        NO_SIGNAL => None,
        signum => Some(signum),
    }
}

/// Maps a MINIX guest signal number (1..16) to its nearest host signal
/// equivalent. Signals with no direct host equivalent map to a host signal
/// that is never raised by anything in this crate's own operation, so
/// installing a handler for it is harmless (`spec.md` §4.5, "Kill").
pub fn guest_to_host_signal(guest_sig: i32) -> i32 {
    match guest_sig {
        1 => libc::SIGHUP,
        2 => libc::SIGINT,
        3 => libc::SIGQUIT,
        4 => libc::SIGILL,
        5 => libc::SIGTRAP,
        6 => libc::SIGABRT,
        7 => libc::SIGWINCH, // SIGEMT has no portable libc equivalent
        8 => libc::SIGFPE,
        9 => libc::SIGKILL,
        10 => libc::SIGBUS,
        11 => libc::SIGSEGV,
        12 => libc::SIGWINCH, // SIGSYS has no portable libc equivalent
        13 => libc::SIGPIPE,
        14 => libc::SIGALRM,
        15 => libc::SIGTERM,
        16 => libc::SIGUSR2,
        _ => libc::SIGWINCH,
    }
}

/// Reverse of [`guest_to_host_signal`], used by the run loop to figure out
/// which guest signal a pending host signal number corresponds to.
pub fn host_to_guest_signal(host_sig: i32) -> Option<i32> {
    (1..=SIGNAL_COUNT as i32).find(|&g| guest_to_host_signal(g) == host_sig)
}

pub struct SignalTable {
    handlers: [u32; SIGNAL_COUNT],
}

impl SignalTable {
    pub fn new() -> Self {
        Self {
            handlers: [HANDLER_DFL; SIGNAL_COUNT],
        }
    }

    fn index(guest_sig: i32) -> Option<usize> {
        if (1..=SIGNAL_COUNT as i32).contains(&guest_sig) {
            Some((guest_sig - 1) as usize)
        } else {
            None
        }
    }

    /// Installs `handler` for `guest_sig` and returns the previous handler,
    /// or `HANDLER_ERR` if `guest_sig` is out of range or the host signal
    /// call failed (`spec.md` §4.5, "Signal").
    pub fn install(&mut self, guest_sig: i32, handler: u32) -> u32 {
        let Some(idx) = Self::index(guest_sig) else {
            return HANDLER_ERR;
        };
        let host_sig = guest_to_host_signal(guest_sig);

        let disposition = match handler {
            HANDLER_DFL => libc::SIG_DFL,
            HANDLER_IGN => libc::SIG_IGN,
            _ => trampoline as usize,
        };

        // SAFETY: `signal(2)` with a valid signal number and a disposition
        // that is either a sentinel or our own extern "C" trampoline.
        let rc = unsafe { libc::signal(host_sig, disposition) };
        if rc == libc::SIG_ERR {
            return HANDLER_ERR;
        }

        let previous = self.handlers[idx];
        self.handlers[idx] = handler;
        previous
    }

    pub fn handler(&self, guest_sig: i32) -> Option<u32> {
        Self::index(guest_sig).map(|idx| self.handlers[idx])
    }
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}
