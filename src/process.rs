//! # Process Bridge
//!
//! Maps guest PIDs (16-bit signed, MINIX-style) to host PIDs and translates
//! `fork`/`wait`/`kill` across that mapping. Guest PIDs 0, 1, and 2 are
//! reserved (memory manager, file system, init); slot 0 holds "self" and
//! slot 1 holds "parent" for the running process. The initial process
//! itself is given a guest PID from the boot chain below the first user
//! PID, so that its *first* `fork()` hands out `FIRST_USER_PID` (7) to the
//! child, matching `spec.md` §8 scenario 5 (`spec.md` §3, §4.5).
//!
//! `fork`/`wait`/`kill` are raw `libc` FFI calls, same as the filesystem
//! bridge — there is no portable safe wrapper for the exact exit-status
//! encoding this bridge needs to reproduce.

use crate::errno::{self, ECHILD, ESRCH};
use crate::signal::guest_to_host_signal;

const INITIAL_CAPACITY: usize = 32;
/// First guest PID handed out to a forked child (`spec.md` §3, §8 scenario 5).
const FIRST_USER_PID: i16 = 7;
/// Guest PID of the initial process itself: the last of the boot-chain
/// tasks (memory manager 0, file system 1, init 2, ..., shell 6), strictly
/// below `FIRST_USER_PID` so its own PID is never handed back out by
/// `reserve()`.
const INITIAL_SELF_PID: i16 = 6;

struct Entry {
    host_pid: i32,
    guest_pid: i16,
}

pub struct ProcessTable {
    entries: Vec<Entry>,
    next_pid: i16,
}

impl ProcessTable {
    /// `own_host_pid` is this process's own `getpid()`; the initial
    /// process has no host parent in guest terms, so slot 1 ("parent")
    /// starts pointing at guest PID 1 (the file system task) per the
    /// boot chain this bridge emulates.
    pub fn new(own_host_pid: i32) -> Self {
        let mut entries = Vec::with_capacity(INITIAL_CAPACITY);
        entries.push(Entry {
            host_pid: own_host_pid,
            guest_pid: INITIAL_SELF_PID,
        });
        entries.push(Entry {
            host_pid: 0,
            guest_pid: 1,
        });
        for _ in 2..INITIAL_CAPACITY {
            entries.push(Entry {
                host_pid: 0,
                guest_pid: -1,
            });
        }
        Self {
            entries,
            next_pid: FIRST_USER_PID,
        }
    }

    pub fn self_pid(&self) -> i16 {
        self.entries[0].guest_pid
    }

    pub fn parent_pid(&self) -> i16 {
        self.entries[1].guest_pid
    }

    fn find_by_host_pid(&self, host_pid: i32) -> Option<usize> {
        self.entries.iter().position(|e| e.host_pid == host_pid)
    }

    fn find_free(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.host_pid == 0)
    }

    fn grow(&mut self) {
        let old_len = self.entries.len();
        let new_len = old_len + old_len / 2;
        for _ in old_len..new_len {
            self.entries.push(Entry {
                host_pid: 0,
                guest_pid: -1,
            });
        }
    }

    /// Reserves a free slot and the next guest PID, growing the table by
    /// 50% if none is free. Returns the slot index and the reserved guest
    /// PID; the caller fills in the host PID once it is known.
    fn reserve(&mut self) -> (usize, i16) {
        let idx = match self.find_free() {
            Some(idx) => idx,
            None => {
                self.grow();
                self.find_free().expect("table was just grown")
            }
        };
        let guest_pid = self.next_pid;
        self.next_pid += 1;
        (idx, guest_pid)
    }

    /// `fork()`. Reserves a slot/PID before forking so parent and child
    /// agree on the new guest PID, then rewrites the table in each branch
    /// per `spec.md` §4.5's parent/child rules. Returns the value to place
    /// in the guest's D0 on return from the trap: the new guest PID in the
    /// parent, or 0 in the child.
    pub fn fork(&mut self) -> Result<i16, i16> {
        let (idx, new_guest_pid) = self.reserve();

        let rc = unsafe { libc::fork() };
        if rc < 0 {
            // Roll back the reservation; the slot becomes free again. The
            // PID counter is not rolled back: a burned PID is harmless,
            // re-using one that escaped to a child process is not.
            self.entries[idx] = Entry {
                host_pid: 0,
                guest_pid: -1,
            };
            return Err(errno::from_last_host_error());
        }

        if rc > 0 {
            // Parent: write (host child pid, new guest pid) into the
            // reserved slot.
            self.entries[idx] = Entry {
                host_pid: rc,
                guest_pid: new_guest_pid,
            };
            Ok(new_guest_pid)
        } else {
            // Child: slot 1 (old parent) moves into the reserved slot
            // (preserving the grandparent); slot 0 (old self) becomes the
            // new slot 1 (old self becomes new parent); slot 0 is
            // rewritten to (host getpid(), new guest pid).
            let old_self = Entry {
                host_pid: self.entries[0].host_pid,
                guest_pid: self.entries[0].guest_pid,
            };
            let old_parent = Entry {
                host_pid: self.entries[1].host_pid,
                guest_pid: self.entries[1].guest_pid,
            };
            self.entries[idx] = old_parent;
            self.entries[1] = old_self;
            self.entries[0] = Entry {
                host_pid: unsafe { libc::getpid() },
                guest_pid: new_guest_pid,
            };
            Ok(0)
        }
    }

    /// `wait()`. Returns the guest PID of the reaped child and its
    /// translated exit status, or a negative MINIX errno.
    pub fn wait(&mut self) -> Result<(i16, i32), i16> {
        let mut host_status: libc::c_int = 0;
        let host_pid = unsafe { libc::wait(&mut host_status) };
        if host_pid < 0 {
            return Err(errno::from_last_host_error());
        }

        let guest_status = encode_exit_status(host_status);
        let guest_pid = match self.find_by_host_pid(host_pid) {
            Some(idx) => {
                let pid = self.entries[idx].guest_pid;
                self.entries[idx] = Entry {
                    host_pid: 0,
                    guest_pid: -1,
                };
                pid
            }
            None => return Err(ECHILD),
        };
        Ok((guest_pid, guest_status))
    }

    /// `kill()`. Translates the guest PID and signal, then delivers.
    pub fn kill(&self, guest_pid: i16, guest_sig: i32) -> i16 {
        let Some(idx) = self.entries.iter().position(|e| e.guest_pid == guest_pid) else {
            return -ESRCH;
        };
        let host_pid = self.entries[idx].host_pid;
        let host_sig = guest_to_host_signal(guest_sig);
        if unsafe { libc::kill(host_pid, host_sig) } == 0 {
            0
        } else {
            -errno::from_last_host_error()
        }
    }
}

/// `spec.md` §4.5, §8 scenario 5: normal exit -> low byte of the exit
/// code; stopped -> `(signal << 8) | 0o177`; signalled -> `signal << 8`.
fn encode_exit_status(host_status: libc::c_int) -> i32 {
    if libc::WIFEXITED(host_status) {
        libc::WEXITSTATUS(host_status) & 0xFF
    } else if libc::WIFSTOPPED(host_status) {
        (libc::WSTOPSIG(host_status) << 8) | 0o177
    } else if libc::WIFSIGNALED(host_status) {
        libc::WTERMSIG(host_status) << 8
    } else {
        // Anything else (should not happen on a POSIX host) synthesizes
        // "killed by SIGKILL".
        libc::SIGKILL << 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_has_self_and_parent_wired() {
        let table = ProcessTable::new(12345);
        assert_eq!(table.self_pid(), INITIAL_SELF_PID);
        assert_eq!(table.parent_pid(), 1);
    }

    #[test]
    fn kill_unknown_guest_pid_is_esrch() {
        let table = ProcessTable::new(1);
        assert_eq!(table.kill(999, 15), -ESRCH);
    }

    #[test]
    fn reserve_allocates_strictly_increasing_pids() {
        let mut table = ProcessTable::new(1);
        let (_, a) = table.reserve();
        let (_, b) = table.reserve();
        assert!(b > a);
        assert_ne!(a, 0);
        assert_ne!(a, 1);
        assert_ne!(a, 2);
    }

    #[test]
    fn table_grows_by_fifty_percent_when_exhausted() {
        let mut table = ProcessTable::new(1);
        let before = table.entries.len();
        for entry in table.entries.iter_mut() {
            if entry.host_pid == 0 {
                entry.host_pid = 1; // simulate "occupied"
            }
        }
        table.reserve();
        assert_eq!(table.entries.len(), before + before / 2);
    }

    /// Scenario 5 of `spec.md` §8: the first `fork()` in the initial
    /// process returns `FIRST_USER_PID` (7) to the parent.
    #[test]
    fn fork_parent_sees_child_pid_and_reaps_it_via_wait() {
        let mut table = ProcessTable::new(unsafe { libc::getpid() });
        let child_guest_pid = table.fork().unwrap();
        if child_guest_pid == 0 {
            // In the child: exit with its own self_pid as the status, so
            // the parent can confirm getpid() == FIRST_USER_PID too.
            unsafe { libc::_exit(table.self_pid() as i32) };
        }
        assert_eq!(child_guest_pid, FIRST_USER_PID);

        let (reaped_pid, status) = table.wait().unwrap();
        assert_eq!(reaped_pid, child_guest_pid);
        assert_eq!(status, FIRST_USER_PID as i32);
    }

    #[test]
    fn encode_exit_status_normal_exit() {
        // Construct a status as if WIFEXITED with code 42: on Linux this
        // is simply the exit code shifted left by 8.
        let status = 42 << 8;
        assert_eq!(encode_exit_status(status), 42);
    }
}
