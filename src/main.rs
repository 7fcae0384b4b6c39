//! `progname <guest-path> [args...]`
//!
//! Loads and stages the named MINIX executable, then hands control to the
//! run loop. This binary links no M68000 core — the instruction decoder
//! is an external collaborator this crate only consumes through
//! [`minixcompat::cpu::Cpu`] — so it validates and stages the guest image
//! (exercising the loader and filesystem bridge) and then reports that a
//! CPU backend must be linked in to actually execute it.

use std::path::PathBuf;

use minixcompat::env::MinixEnv;
use minixcompat::error::CoreError;
use minixcompat::exec;
use minixcompat::fs::Filesystem;

struct Config {
    minix_root: PathBuf,
    guest_pwd: Option<String>,
    guest_path: String,
    guest_args: Vec<String>,
}

impl Config {
    /// `spec.md` §6: `MINIXCOMPAT_DIR` (default `/opt/minix`),
    /// `MINIXCOMPAT_PWD`, and the invocation `<guest-path> [args...]`.
    fn from_env_and_args(mut args: impl Iterator<Item = String>) -> Result<Self, CoreError> {
        args.next(); // argv[0], the host program name.
        let guest_path = args
            .next()
            .ok_or_else(|| CoreError::Usage("usage: minixcompat <guest-path> [args...]".to_string()))?;
        let guest_args: Vec<String> = args.collect();

        let minix_root = std::env::var("MINIXCOMPAT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/opt/minix"));
        let guest_pwd = std::env::var("MINIXCOMPAT_PWD").ok();

        Ok(Self {
            minix_root,
            guest_pwd,
            guest_path,
            guest_args,
        })
    }
}

fn run() -> Result<i32, CoreError> {
    let config = Config::from_env_and_args(std::env::args())?;

    let fs = Filesystem::new(config.minix_root, config.guest_pwd);
    let mut env = MinixEnv::new(fs, std::process::id() as i32);

    exec::startup(&mut env, &config.guest_path, &config.guest_args)?;
    log::info!(
        "staged {} at {:#x}, break {:#x}; no CPU backend is linked into this build",
        config.guest_path,
        minixcompat::loader::EXEC_BASE,
        env.current_break()
    );

    Err(CoreError::NotExecutable(
        "no M68000 CPU backend is linked into this build (spec.md §1: the guest CPU is an \
         external collaborator consumed only through minixcompat::cpu::Cpu)"
            .to_string(),
    ))
}

fn main() {
    env_logger::init();

    match run() {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            log::error!("{e}");
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}
