//! # Filesystem Bridge
//!
//! Guest paths are rooted under a host directory and every guest-visible
//! file descriptor is backed by a real host one. Flags, mode bits, and
//! `stat` layouts are translated at the boundary; everything else is a
//! thin pass-through to `libc` (`spec.md` §4.4).
//!
//! Like the process bridge, this talks to the host through raw `libc` FFI
//! rather than a safe wrapper crate, in the same style the Linux syscall
//! plumbing in this codebase's ancestry uses — every host call here
//! returns its own errno on failure, immediately classified through
//! [`crate::errno`].

use std::ffi::CString;
use std::path::{Path, PathBuf};

use crate::error::bug;
use crate::errno::{self, EINVAL, EIO};

/// Number of guest file-descriptor slots (`spec.md` §3).
pub const NOFILE: usize = 20;

const DIRENT_SIZE: usize = 16;
const DIRENT_NAME_LEN: usize = 14;
const DIRENT_GROW: usize = 32;

/// Guest open-flag bits (octal, matching MINIX's `<fcntl.h>`).
pub mod open_flags {
    pub const O_ACCMODE: i32 = 0o3;
    pub const O_CREAT: i32 = 0o100;
    pub const O_EXCL: i32 = 0o200;
    pub const O_NOCTTY: i32 = 0o400;
    pub const O_TRUNC: i32 = 0o1000;
    pub const O_APPEND: i32 = 0o2000;
    pub const O_NONBLOCK: i32 = 0o4000;
}

/// Guest mode bits (octal, matching MINIX's `<sys/stat.h>`).
pub mod mode_bits {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFBLK: u32 = 0o060000;
    pub const S_IFCHR: u32 = 0o020000;
    pub const S_IFIFO: u32 = 0o010000;
    pub const S_ISUID: u32 = 0o004000;
    pub const S_ISGID: u32 = 0o002000;
    pub const S_ISVTX: u32 = 0o001000;
    pub const PERM_MASK: u32 = 0o000777;
}

/// Translates a guest open-flag bitmask into the host's `open(2)` flags.
fn translate_open_flags(guest_flags: i32) -> i32 {
    use open_flags::*;
    let mut host = match guest_flags & O_ACCMODE {
        0 => libc::O_RDONLY,
        1 => libc::O_WRONLY,
        2 => libc::O_RDWR,
        _ => libc::O_RDONLY,
    };
    if guest_flags & O_CREAT != 0 {
        host |= libc::O_CREAT;
    }
    if guest_flags & O_EXCL != 0 {
        host |= libc::O_EXCL;
    }
    if guest_flags & O_NOCTTY != 0 {
        host |= libc::O_NOCTTY;
    }
    if guest_flags & O_TRUNC != 0 {
        host |= libc::O_TRUNC;
    }
    if guest_flags & O_APPEND != 0 {
        host |= libc::O_APPEND;
    }
    if guest_flags & O_NONBLOCK != 0 {
        host |= libc::O_NONBLOCK;
    }
    host
}

/// Translates guest mode bits (used as the `mode` argument to `open`/access
/// checks) into host `mode_t` permission bits. Only the low nine
/// permission bits plus setuid/setgid/sticky are meaningful here.
fn translate_mode(guest_mode: u32) -> libc::mode_t {
    use mode_bits::*;
    (guest_mode & (PERM_MASK | S_ISUID | S_ISGID | S_ISVTX)) as libc::mode_t
}

/// A single pre-materialized guest directory entry.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub inode: u16,
    pub name: [u8; DIRENT_NAME_LEN],
}

impl DirEntry {
    fn empty() -> Self {
        Self {
            inode: 0,
            name: [0; DIRENT_NAME_LEN],
        }
    }

    fn to_wire(self) -> [u8; DIRENT_SIZE] {
        let mut buf = [0u8; DIRENT_SIZE];
        buf[0..2].copy_from_slice(&self.inode.to_be_bytes());
        buf[2..2 + DIRENT_NAME_LEN].copy_from_slice(&self.name);
        buf
    }
}

enum Kind {
    File,
    Directory { entries: Vec<DirEntry>, cursor: usize },
}

struct Slot {
    host_fd: i32,
    kind: Kind,
}

pub struct FdTable {
    slots: [Option<Slot>; NOFILE],
}

impl FdTable {
    pub fn new() -> Self {
        const NONE: Option<Slot> = None;
        let mut slots = [NONE; NOFILE];
        for (i, host_fd) in [0, 1, 2].into_iter().enumerate() {
            slots[i] = Some(Slot {
                host_fd,
                kind: Kind::File,
            });
        }
        Self { slots }
    }

    fn lowest_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    fn slot(&self, guest_fd: i16) -> Option<&Slot> {
        if !(0..NOFILE as i16).contains(&guest_fd) {
            return None;
        }
        self.slots[guest_fd as usize].as_ref()
    }

    fn slot_mut(&mut self, guest_fd: i16) -> Option<&mut Slot> {
        if !(0..NOFILE as i16).contains(&guest_fd) {
            return None;
        }
        self.slots[guest_fd as usize].as_mut()
    }

    /// Closes and releases `guest_fd`'s host resources unconditionally,
    /// even when this table itself is being torn down early (e.g. a
    /// failed `open`).
    fn release(&mut self, guest_fd: i16) {
        if !(0..NOFILE as i16).contains(&guest_fd) {
            return;
        }
        self.slots[guest_fd as usize] = None;
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Filesystem {
    minix_root: PathBuf,
    host_pwd: String,
    pub fds: FdTable,
}

impl Filesystem {
    /// `minix_root` comes from `MINIXCOMPAT_DIR` (default `/opt/minix`).
    /// `guest_pwd` comes from `MINIXCOMPAT_PWD` if set, else the host cwd
    /// if it lies under `minix_root` (prefix stripped), else `/`
    /// (`spec.md` §4.4).
    pub fn new(minix_root: PathBuf, guest_pwd: Option<String>) -> Self {
        let host_pwd = guest_pwd.unwrap_or_else(|| {
            std::env::current_dir()
                .ok()
                .and_then(|cwd| strip_minix_prefix(&cwd, &minix_root))
                .unwrap_or_else(|| "/".to_string())
        });
        Self {
            minix_root,
            host_pwd,
            fds: FdTable::new(),
        }
    }

    /// `spec.md` §4.4, §8: absolute paths root under the MINIX install
    /// directory; relative paths root under the guest working directory.
    pub fn host_path_for(&self, guest_path: &str) -> PathBuf {
        if let Some(rest) = guest_path.strip_prefix('/') {
            self.minix_root.join(rest)
        } else {
            Path::new(&self.host_pwd).join(guest_path)
        }
    }

    pub fn open(&mut self, guest_path: &str, guest_flags: i32, guest_mode: u32) -> Result<i16, i16> {
        let Some(idx) = self.fds.lowest_free() else {
            return Err(errno::EMFILE);
        };
        let host_path = self.host_path_for(guest_path);
        let c_path = match CString::new(host_path.as_os_str().as_encoded_bytes()) {
            Ok(c) => c,
            Err(_) => return Err(EINVAL),
        };

        let host_fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                translate_open_flags(guest_flags),
                translate_mode(guest_mode) as libc::c_uint,
            )
        };
        if host_fd < 0 {
            return Err(errno::from_last_host_error());
        }

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(host_fd, &mut st) } != 0 {
            let e = errno::from_last_host_error();
            unsafe {
                libc::close(host_fd);
            }
            return Err(e);
        }

        let kind = if st.st_mode & libc::S_IFMT == libc::S_IFDIR {
            match precache_directory(&host_path) {
                Ok(entries) => Kind::Directory { entries, cursor: 0 },
                Err(e) => {
                    unsafe {
                        libc::close(host_fd);
                    }
                    return Err(e);
                }
            }
        } else {
            Kind::File
        };

        let guest_fd = idx as i16;
        self.fds.slots[idx] = Some(Slot { host_fd, kind });
        Ok(guest_fd)
    }

    pub fn close(&mut self, guest_fd: i16) -> i16 {
        let Some(slot) = self.fds.slot_mut(guest_fd) else {
            return -errno::EBADF;
        };
        let host_fd = slot.host_fd;
        self.fds.release(guest_fd);
        if unsafe { libc::close(host_fd) } == 0 {
            0
        } else {
            -errno::from_last_host_error()
        }
    }

    pub fn read(&mut self, guest_fd: i16, buf: &mut [u8]) -> Result<usize, i16> {
        let Some(slot) = self.fds.slot_mut(guest_fd) else {
            return Err(errno::EBADF);
        };
        match &mut slot.kind {
            Kind::File => {
                let n =
                    unsafe { libc::read(slot.host_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
                if n < 0 {
                    Err(errno::from_last_host_error())
                } else {
                    Ok(n as usize)
                }
            }
            Kind::Directory { entries, cursor } => {
                let total_bytes = entries.len() * DIRENT_SIZE;
                // MINIX readdir reads fixed-size chunks; a request that is
                // not a whole number of entries, or that does not start on
                // an entry boundary, or that runs past the end, is an I/O
                // error (`spec.md` §4.4).
                if buf.len() % DIRENT_SIZE != 0
                    || *cursor % DIRENT_SIZE != 0
                    || *cursor + buf.len() > total_bytes
                {
                    return Err(EIO);
                }
                let first_entry = *cursor / DIRENT_SIZE;
                let count = buf.len() / DIRENT_SIZE;
                for (i, entry) in entries[first_entry..first_entry + count].iter().enumerate() {
                    buf[i * DIRENT_SIZE..(i + 1) * DIRENT_SIZE].copy_from_slice(&entry.to_wire());
                }
                *cursor += buf.len();
                Ok(buf.len())
            }
        }
    }

    pub fn write(&mut self, guest_fd: i16, buf: &[u8]) -> Result<usize, i16> {
        let Some(slot) = self.fds.slot(guest_fd) else {
            return Err(errno::EBADF);
        };
        match slot.kind {
            Kind::Directory { .. } => bug("write issued against a directory file descriptor"),
            Kind::File => {
                let n = unsafe { libc::write(slot.host_fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
                if n < 0 {
                    Err(errno::from_last_host_error())
                } else {
                    Ok(n as usize)
                }
            }
        }
    }

    pub fn seek(&mut self, guest_fd: i16, offset: i32, whence: i32) -> Result<i32, i16> {
        let Some(slot) = self.fds.slot_mut(guest_fd) else {
            return Err(errno::EBADF);
        };
        match &mut slot.kind {
            Kind::File => {
                let host_whence = match whence {
                    0 => libc::SEEK_SET,
                    1 => libc::SEEK_CUR,
                    2 => libc::SEEK_END,
                    _ => return Err(EINVAL),
                };
                let pos = unsafe { libc::lseek(slot.host_fd, offset as libc::off_t, host_whence) };
                if pos < 0 {
                    Err(errno::from_last_host_error())
                } else {
                    Ok(pos as i32)
                }
            }
            Kind::Directory { entries, cursor } => {
                let total_bytes = (entries.len() * DIRENT_SIZE) as i64;
                let max_valid = (total_bytes - 1).max(0);
                let base = match whence {
                    0 => 0i64,
                    1 => *cursor as i64,
                    2 => total_bytes,
                    _ => return Err(EINVAL),
                };
                let new_pos = base + offset as i64;
                if new_pos < 0 || new_pos > max_valid {
                    return Err(EINVAL);
                }
                *cursor = new_pos as usize;
                Ok(new_pos as i32)
            }
        }
    }

    pub fn fstat(&self, guest_fd: i16, out: &mut [u8; GUEST_STAT_SIZE]) -> Result<(), i16> {
        let Some(slot) = self.fds.slot(guest_fd) else {
            return Err(errno::EBADF);
        };
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(slot.host_fd, &mut st) } != 0 {
            return Err(errno::from_last_host_error());
        }
        *out = translate_stat(&st);
        Ok(())
    }

    pub fn stat(&self, guest_path: &str, out: &mut [u8; GUEST_STAT_SIZE]) -> Result<(), i16> {
        let host_path = self.host_path_for(guest_path);
        let c_path = CString::new(host_path.as_os_str().as_encoded_bytes()).map_err(|_| EINVAL)?;
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::stat(c_path.as_ptr(), &mut st) } != 0 {
            return Err(errno::from_last_host_error());
        }
        *out = translate_stat(&st);
        Ok(())
    }

    pub fn unlink(&self, guest_path: &str) -> i16 {
        let host_path = self.host_path_for(guest_path);
        let c_path = match CString::new(host_path.as_os_str().as_encoded_bytes()) {
            Ok(c) => c,
            Err(_) => return -EINVAL,
        };
        if unsafe { libc::unlink(c_path.as_ptr()) } == 0 {
            0
        } else {
            -errno::from_last_host_error()
        }
    }

    pub fn access(&self, guest_path: &str, guest_mode: u32) -> i16 {
        let host_path = self.host_path_for(guest_path);
        let c_path = match CString::new(host_path.as_os_str().as_encoded_bytes()) {
            Ok(c) => c,
            Err(_) => return -EINVAL,
        };
        if unsafe { libc::access(c_path.as_ptr(), translate_mode(guest_mode) as libc::c_int) } == 0 {
            0
        } else {
            -errno::from_last_host_error()
        }
    }
}

/// `spec.md` §4.4, §9: containment is re-derived from the stated intent
/// ("is the host cwd inside the MINIX root?"), not from a byte-level
/// prefix comparison that would admit false positives on a proper-prefix
/// sibling directory (e.g. `/opt/minix2` under root `/opt/minix`).
fn strip_minix_prefix(cwd: &Path, minix_root: &Path) -> Option<String> {
    let rest = cwd.strip_prefix(minix_root).ok()?;
    if rest.as_os_str().is_empty() {
        Some("/".to_string())
    } else {
        Some(format!("/{}", rest.display()))
    }
}

fn precache_directory(host_path: &Path) -> Result<Vec<DirEntry>, i16> {
    let c_path = CString::new(host_path.as_os_str().as_encoded_bytes()).map_err(|_| EINVAL)?;
    let dir = unsafe { libc::opendir(c_path.as_ptr()) };
    if dir.is_null() {
        return Err(errno::from_last_host_error());
    }

    let mut entries = Vec::new();
    loop {
        unsafe { *libc::__errno_location() = 0 };
        let ent = unsafe { libc::readdir(dir) };
        if ent.is_null() {
            break;
        }
        let raw = unsafe { &*ent };
        let name_bytes: &[u8] = unsafe {
            std::slice::from_raw_parts(raw.d_name.as_ptr() as *const u8, raw.d_name.len())
        };
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = &name_bytes[..nul];

        let inode = truncate_inode(raw.d_ino as u64);
        let mut entry = DirEntry::empty();
        entry.inode = inode;
        let copy_len = name.len().min(DIRENT_NAME_LEN);
        entry.name[..copy_len].copy_from_slice(&name[..copy_len]);
        entries.push(entry);

        if entries.len() % DIRENT_GROW == 0 {
            entries.reserve(DIRENT_GROW);
        }
    }
    unsafe {
        libc::closedir(dir);
    }
    Ok(entries)
}

/// Truncates a host inode to 16 bits; if that would yield 0 while the host
/// inode is non-zero, folds the upper halves by addition until a non-zero
/// result appears (`spec.md` §4.4).
fn truncate_inode(host_inode: u64) -> u16 {
    if host_inode == 0 {
        return 0;
    }
    let mut acc = (host_inode & 0xFFFF) as u32;
    let mut rest = host_inode >> 16;
    while acc == 0 && rest != 0 {
        acc = acc.wrapping_add((rest & 0xFFFF) as u32) & 0xFFFF;
        rest >>= 16;
    }
    if acc == 0 {
        // A genuinely all-zero-modulo-16-bits inode; extremely unlikely
        // but keep the invariant "nonzero host inode never maps to 0".
        1
    } else {
        acc as u16
    }
}

/// Guest `stat` record size: device(2) + inode(2) + mode(2) + nlink(2) +
/// uid(2) + gid(2) + rdev(2) + size(4) + atime(4) + mtime(4) + ctime(4).
pub const GUEST_STAT_SIZE: usize = 2 * 7 + 4 * 4;

fn translate_file_type(host_mode: libc::mode_t) -> u32 {
    use mode_bits::*;
    match host_mode as u32 & libc::S_IFMT {
        m if m == libc::S_IFREG => S_IFREG,
        m if m == libc::S_IFDIR => S_IFDIR,
        m if m == libc::S_IFBLK => S_IFBLK,
        m if m == libc::S_IFCHR => S_IFCHR,
        m if m == libc::S_IFIFO => S_IFIFO,
        _ => 0,
    }
}

fn translate_stat(st: &libc::stat) -> [u8; GUEST_STAT_SIZE] {
    use mode_bits::*;

    let guest_type = translate_file_type(st.st_mode as libc::mode_t);
    let guest_perm_bits = st.st_mode as u32 & (PERM_MASK | S_ISUID | S_ISGID | S_ISVTX);
    let guest_mode = (guest_type | guest_perm_bits) as u16;
    let size = (st.st_size as i64).clamp(0, 0x7FFF_FFFF) as u32;

    let fields16 = [
        st.st_dev as u16,
        truncate_inode(st.st_ino),
        guest_mode,
        st.st_nlink as u16,
        st.st_uid as u16,
        st.st_gid as u16,
        st.st_rdev as u16,
    ];
    let fields32 = [size, st.st_atime as u32, st.st_mtime as u32, st.st_ctime as u32];

    let mut out = [0u8; GUEST_STAT_SIZE];
    let mut w = 0;
    for v in fields16 {
        out[w..w + 2].copy_from_slice(&v.to_be_bytes());
        w += 2;
    }
    for v in fields32 {
        out[w..w + 4].copy_from_slice(&v.to_be_bytes());
        w += 4;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn fixture() -> (tempfile::TempDir, Filesystem) {
        let dir = tempfile::tempdir().unwrap();
        let fs = Filesystem::new(dir.path().to_path_buf(), Some("/".to_string()));
        (dir, fs)
    }

    #[test]
    fn host_path_for_roots_absolute_and_relative_paths() {
        let (dir, mut fs) = fixture();
        fs.host_pwd = "/home/user".to_string();
        assert_eq!(fs.host_path_for("/etc/motd"), dir.path().join("etc/motd"));
        assert_eq!(fs.host_path_for("a.out"), Path::new("/home/user/a.out"));
    }

    #[test]
    fn stdio_slots_are_prewired() {
        let (_dir, fs) = fixture();
        assert!(fs.fds.slot(0).is_some());
        assert!(fs.fds.slot(1).is_some());
        assert!(fs.fds.slot(2).is_some());
        assert!(fs.fds.slot(3).is_none());
    }

    /// Scenario 3 of `spec.md` §8.
    #[test]
    fn open_then_read_returns_file_contents() {
        let (dir, mut fs) = fixture();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/motd"), b"hello\n").unwrap();

        let fd = fs.open("/etc/motd", 0, 0).unwrap();
        assert!(fd >= 0);

        let mut buf = [0u8; 6];
        let n = fs.read(fd, &mut buf).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buf, b"hello\n");
    }

    #[test]
    fn open_missing_file_reports_enoent() {
        let (_dir, mut fs) = fixture();
        let err = fs.open("/no/such/file", 0, 0).unwrap_err();
        assert_eq!(err, errno::ENOENT);
    }

    #[test]
    fn close_releases_the_slot() {
        let (dir, mut fs) = fixture();
        std::fs::write(dir.path().join("f"), b"x").unwrap();
        let fd = fs.open("/f", 0, 0).unwrap();
        assert_eq!(fs.close(fd), 0);
        assert!(fs.fds.slot(fd).is_none());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let (dir, mut fs) = fixture();
        std::fs::write(dir.path().join("w"), b"").unwrap();
        let fd = fs
            .open("/w", open_flags::O_TRUNC | 1 /* O_WRONLY */, 0)
            .unwrap();
        let n = fs.write(fd, b"payload").unwrap();
        assert_eq!(n, 7);
        fs.close(fd);

        let fd = fs.open("/w", 0, 0).unwrap();
        let mut buf = [0u8; 7];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 7);
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn directory_read_serves_prewired_entries_in_fixed_chunks() {
        let (dir, mut fs) = fixture();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/one"), b"").unwrap();

        let fd = fs.open("/sub", 0, 0).unwrap();
        let mut buf = [0u8; DIRENT_SIZE];
        // `.`, `..`, and `one` are present in some order; read the first
        // chunk and confirm it is exactly DIRENT_SIZE bytes.
        assert_eq!(fs.read(fd, &mut buf).unwrap(), DIRENT_SIZE);
    }

    #[test]
    fn directory_read_with_misaligned_size_is_io_error() {
        let (dir, mut fs) = fixture();
        std::fs::create_dir(dir.path().join("sub2")).unwrap();
        let fd = fs.open("/sub2", 0, 0).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(fs.read(fd, &mut buf).unwrap_err(), EIO);
    }

    #[test]
    fn seek_set_and_cur_on_a_regular_file() {
        let (dir, mut fs) = fixture();
        let mut f = std::fs::File::create(dir.path().join("s")).unwrap();
        f.write_all(b"0123456789").unwrap();
        drop(f);

        let fd = fs.open("/s", 0, 0).unwrap();
        assert_eq!(fs.seek(fd, 5, 0).unwrap(), 5);
        let mut buf = [0u8; 2];
        fs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"56");
    }

    #[test]
    fn fstat_reports_regular_file_type_and_size() {
        let (dir, mut fs) = fixture();
        std::fs::write(dir.path().join("st"), b"abcd").unwrap();
        let fd = fs.open("/st", 0, 0).unwrap();
        let mut out = [0u8; GUEST_STAT_SIZE];
        fs.fstat(fd, &mut out).unwrap();
        let mode = u16::from_be_bytes([out[4], out[5]]);
        assert_eq!(mode as u32 & mode_bits::S_IFMT, mode_bits::S_IFREG);
        let size = u32::from_be_bytes([out[12], out[13], out[14], out[15]]);
        assert_eq!(size, 4);
    }

    #[test]
    fn unlink_removes_the_file() {
        let (dir, fs) = fixture();
        let path = dir.path().join("u");
        std::fs::write(&path, b"x").unwrap();
        assert_eq!(fs.unlink("/u"), 0);
        assert!(!path.exists());
    }

    #[test]
    fn truncate_inode_folds_nonzero_low_half() {
        assert_eq!(truncate_inode(0), 0);
        assert_eq!(truncate_inode(0x0001_0000), 1);
        assert_eq!(truncate_inode(0x1234_5678), 0x5678);
    }
}
