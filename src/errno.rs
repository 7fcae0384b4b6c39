//! # Guest Errno Table
//!
//! Every host error a bridge function can observe is first classified into
//! a guest (MINIX) errno before it is handed back across the ABI boundary.
//! MINIX follows the classic Unix V7 numbering for its first 38 codes;
//! anything the host reports that has no MINIX equivalent collapses to the
//! catch-all `ERROR` code, per `spec.md` §7.
//!
//! The table is deliberately a flat `const` list, in the same style the
//! Linux-facing errno table in this codebase's ancestry uses: one line per
//! code, no generated macros, so a reader can diff it against a reference
//! `errno.h` by eye.

/// Catch-all for any host errno with no MINIX counterpart.
pub const ERROR: i16 = 99;

pub const EPERM: i16 = 1;
pub const ENOENT: i16 = 2;
pub const ESRCH: i16 = 3;
pub const EINTR: i16 = 4;
pub const EIO: i16 = 5;
pub const ENXIO: i16 = 6;
pub const E2BIG: i16 = 7;
pub const ENOEXEC: i16 = 8;
pub const EBADF: i16 = 9;
pub const ECHILD: i16 = 10;
pub const EAGAIN: i16 = 11;
pub const ENOMEM: i16 = 12;
pub const EACCES: i16 = 13;
pub const EFAULT: i16 = 14;
pub const ENOTBLK: i16 = 15;
pub const EBUSY: i16 = 16;
pub const EEXIST: i16 = 17;
pub const EXDEV: i16 = 18;
pub const ENODEV: i16 = 19;
pub const ENOTDIR: i16 = 20;
pub const EISDIR: i16 = 21;
pub const EINVAL: i16 = 22;
pub const ENFILE: i16 = 23;
pub const EMFILE: i16 = 24;
pub const ENOTTY: i16 = 25;
pub const ETXTBSY: i16 = 26;
pub const EFBIG: i16 = 27;
pub const ENOSPC: i16 = 28;
pub const ESPIPE: i16 = 29;
pub const EROFS: i16 = 30;
pub const EMLINK: i16 = 31;
pub const EPIPE: i16 = 32;
pub const EDOM: i16 = 33;
pub const ERANGE: i16 = 34;
pub const EDEADLK: i16 = 35;
pub const ENAMETOOLONG: i16 = 36;
pub const ENOLCK: i16 = 37;
pub const ENOSYS: i16 = 38;

/// Classifies a host `errno` value (as returned by `libc` in `errno`)
/// into its MINIX equivalent. Unknown codes map to [`ERROR`].
pub fn from_host(host_errno: i32) -> i16 {
    match host_errno {
        libc::EPERM => EPERM,
        libc::ENOENT => ENOENT,
        libc::ESRCH => ESRCH,
        libc::EINTR => EINTR,
        libc::EIO => EIO,
        libc::ENXIO => ENXIO,
        libc::E2BIG => E2BIG,
        libc::ENOEXEC => ENOEXEC,
        libc::EBADF => EBADF,
        libc::ECHILD => ECHILD,
        libc::EAGAIN => EAGAIN,
        libc::ENOMEM => ENOMEM,
        libc::EACCES => EACCES,
        libc::EFAULT => EFAULT,
        libc::ENOTBLK => ENOTBLK,
        libc::EBUSY => EBUSY,
        libc::EEXIST => EEXIST,
        libc::EXDEV => EXDEV,
        libc::ENODEV => ENODEV,
        libc::ENOTDIR => ENOTDIR,
        libc::EISDIR => EISDIR,
        libc::EINVAL => EINVAL,
        libc::ENFILE => ENFILE,
        libc::EMFILE => EMFILE,
        libc::ENOTTY => ENOTTY,
        libc::ETXTBSY => ETXTBSY,
        libc::EFBIG => EFBIG,
        libc::ENOSPC => ENOSPC,
        libc::ESPIPE => ESPIPE,
        libc::EROFS => EROFS,
        libc::EMLINK => EMLINK,
        libc::EPIPE => EPIPE,
        libc::EDOM => EDOM,
        libc::ERANGE => ERANGE,
        libc::EDEADLK => EDEADLK,
        libc::ENAMETOOLONG => ENAMETOOLONG,
        libc::ENOLCK => ENOLCK,
        libc::ENOSYS => ENOSYS,
        _ => ERROR,
    }
}

/// Returns the negative MINIX errno for the `errno` value currently set by
/// the last failed libc call on this thread.
pub fn from_last_host_error() -> i16 {
    from_host(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
}
