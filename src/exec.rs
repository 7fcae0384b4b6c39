//! # Exec Staging
//!
//! Shared logic between the two entry points `spec.md` §4.5 describes for
//! loading a new executable: a guest-triggered `exece` trap, and the
//! host-startup exec that bootstraps the very first guest process. Both
//! end up building the same kind of stack snapshot — `argc`, an `argv`
//! pointer table terminated by `NULL`, an `envp` pointer table terminated
//! by `NULL`, then the string bytes those pointers refer to — and handing
//! it to [`stage`], which loads the image, rebases every pointer by the
//! stack base, and writes both into guest RAM.

use crate::env::{MinixEnv, STACK_BASE};
use crate::errno;
use crate::error::CoreError;
use crate::loader::{self, EXEC_BASE};

/// Loads `guest_path`'s executable image at [`EXEC_BASE`], rebases and
/// writes `raw_snapshot` (already in the "offsets from the start of the
/// snapshot" form `spec.md` §4.5 describes) at [`STACK_BASE`]. Does not
/// touch execution state; the caller (the dispatcher for `exece`, or
/// startup for the initial exec) transitions state once this succeeds.
pub fn load_and_stage(env: &mut MinixEnv, guest_path: &str, raw_snapshot: &[u8]) -> Result<(), i16> {
    let host_path = env.fs.host_path_for(guest_path);
    let file = std::fs::File::open(&host_path).map_err(|_| errno::ENOENT)?;
    let mut reader = std::io::BufReader::new(file);
    let loaded = loader::load(&mut reader).map_err(|_| errno::ENOEXEC)?;

    env.ram.block_from_host(EXEC_BASE, &loaded.image);
    env.set_initial_break(EXEC_BASE + loaded.image.len() as u32);

    let mut snapshot = raw_snapshot.to_vec();
    rebase_pointers(&mut snapshot)?;
    env.ram.block_from_host(STACK_BASE, &snapshot);
    Ok(())
}

/// Rewrites the `argv` and `envp` pointer tables in place, adding
/// [`STACK_BASE`] to each non-NULL entry. Both tables are terminated by a
/// zero word.
fn rebase_pointers(buf: &mut [u8]) -> Result<(), i16> {
    if buf.len() < 4 {
        return Err(errno::EINVAL);
    }
    let mut pos = 4usize;
    for _table in 0..2 {
        loop {
            if pos + 4 > buf.len() {
                return Err(errno::EINVAL);
            }
            let word = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());
            pos += 4;
            if word == 0 {
                break;
            }
            let rebased = word.wrapping_add(STACK_BASE);
            buf[pos - 4..pos].copy_from_slice(&rebased.to_be_bytes());
        }
    }
    Ok(())
}

/// Builds a raw stack snapshot from already-resolved `argv`/`envp`
/// strings, with each table entry storing the string's offset from the
/// start of the whole snapshot (`spec.md` §4.5, "Stack layout rules").
fn build_snapshot(argv: &[String], envp: &[String]) -> Vec<u8> {
    let argc = argv.len() as u32;
    let envc = envp.len() as u32;
    let pointer_table_size = 4 + (argc + 1) * 4 + (envc + 1) * 4;

    let mut string_area = Vec::new();
    let mut argv_offsets = Vec::with_capacity(argv.len());
    let mut envp_offsets = Vec::with_capacity(envp.len());
    for s in argv {
        argv_offsets.push(pointer_table_size + string_area.len() as u32);
        push_aligned_cstr(&mut string_area, s);
    }
    for s in envp {
        envp_offsets.push(pointer_table_size + string_area.len() as u32);
        push_aligned_cstr(&mut string_area, s);
    }

    let mut buf = Vec::with_capacity(pointer_table_size as usize + string_area.len());
    buf.extend_from_slice(&argc.to_be_bytes());
    for off in argv_offsets {
        buf.extend_from_slice(&off.to_be_bytes());
    }
    buf.extend_from_slice(&0u32.to_be_bytes());
    for off in envp_offsets {
        buf.extend_from_slice(&off.to_be_bytes());
    }
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&string_area);
    buf
}

fn push_aligned_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// Bootstraps the very first guest process from host `argv`/`envp`. Only
/// host environment variables prefixed `MINIX_` are exported, with the
/// prefix stripped (`spec.md` §6).
pub fn startup(env: &mut MinixEnv, guest_path: &str, guest_args: &[String]) -> Result<(), CoreError> {
    let mut argv = vec![guest_path.to_string()];
    argv.extend_from_slice(guest_args);

    let envp: Vec<String> = std::env::vars()
        .filter_map(|(k, v)| k.strip_prefix("MINIX_").map(|name| format!("{name}={v}")))
        .collect();

    let snapshot = build_snapshot(&argv, &envp);
    load_and_stage(env, guest_path, &snapshot)
        .map_err(|e| CoreError::NotExecutable(format!("startup exec failed, guest errno {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Filesystem;
    use std::io::Write as _;

    fn minimal_executable(text: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        let data_len = 0u32;
        let total = (text.len() as u32).div_ceil(256) * 256;
        for field in [loader::MAGIC_SEPARATE, loader::FLAGS_REQUIRED, text.len() as u32, data_len, 0, 0, total.max(256), 0] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        bytes.extend_from_slice(text);
        bytes.resize(32 + total.max(256) as usize, 0);
        bytes
    }

    #[test]
    fn build_snapshot_offsets_point_past_the_pointer_tables() {
        let argv = vec!["prog".to_string(), "arg1".to_string()];
        let envp = vec!["HOME=/".to_string()];
        let snap = build_snapshot(&argv, &envp);

        let argc = u32::from_be_bytes(snap[0..4].try_into().unwrap());
        assert_eq!(argc, 2);

        // pointer_table_size = 4 + 3*4 + 2*4 = 4 + 12 + 8 = 24.
        let first_argv_off = u32::from_be_bytes(snap[4..8].try_into().unwrap());
        assert_eq!(first_argv_off, 24);
    }

    #[test]
    fn rebase_pointers_adds_stack_base_to_every_table_entry() {
        let argv = vec!["a".to_string()];
        let envp: Vec<String> = vec![];
        let mut snap = build_snapshot(&argv, &envp);
        let original_off = u32::from_be_bytes(snap[4..8].try_into().unwrap());
        rebase_pointers(&mut snap).unwrap();
        let rebased = u32::from_be_bytes(snap[4..8].try_into().unwrap());
        assert_eq!(rebased, original_off + STACK_BASE);
    }

    #[test]
    fn startup_loads_image_and_stages_stack() {
        let dir = tempfile::tempdir().unwrap();
        let exe = minimal_executable(b"\x00\x00\x00\x00");
        let mut f = std::fs::File::create(dir.path().join("prog")).unwrap();
        f.write_all(&exe).unwrap();
        drop(f);

        let fs = Filesystem::new(dir.path().to_path_buf(), Some("/".to_string()));
        let mut env = MinixEnv::new(fs, unsafe { libc::getpid() });
        startup(&mut env, "/prog", &[]).unwrap();

        // argc for a zero-arg startup is 1 (argv[0] == the program path).
        assert_eq!(env.ram.read32(STACK_BASE), 1);
        assert!(env.current_break() >= EXEC_BASE);
    }

    #[test]
    fn startup_with_missing_executable_is_not_executable_error() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Filesystem::new(dir.path().to_path_buf(), Some("/".to_string()));
        let mut env = MinixEnv::new(fs, 1);
        assert!(startup(&mut env, "/missing", &[]).is_err());
    }
}
