//! # Run Loop
//!
//! Drives any [`Cpu`] implementor through the execution state machine
//! described in `spec.md` §4.7: perform the startup exec, bootstrap the
//! CPU, run quanta, dispatch traps, and deliver pending signals between
//! quanta — never from host signal context.

use crate::cpu::{Cpu, Register, StopReason};
use crate::dispatch;
use crate::env::{ExecState, MinixEnv, STACK_BASE};
use crate::exec;
use crate::loader::EXEC_BASE;
use crate::message::{Message, MESSAGE_SIZE};
use crate::signal;

/// `spec.md` §4.7: one quantum is 10,000 guest cycles.
pub const QUANTUM_CYCLES: u32 = 10_000;

/// Runs `cpu`/`env` to completion and returns the guest exit status (or a
/// pre-exec startup error's exit code).
pub fn run<C: Cpu>(cpu: &mut C, env: &mut MinixEnv, guest_path: &str, args: &[String]) -> i32 {
    loop {
        match env.state() {
            ExecState::Started => match exec::startup(env, guest_path, args) {
                Ok(()) => env.transition(ExecState::Ready),
                Err(e) => {
                    log::error!("{e}");
                    return e.exit_code();
                }
            },
            ExecState::Ready => {
                bootstrap(cpu, env);
                env.transition(ExecState::Running);
            }
            ExecState::Running => {
                run_quantum(cpu, env);
                if env.state() == ExecState::Running {
                    deliver_pending_signal(cpu, env);
                }
            }
            ExecState::Finished => return env.exit_status.unwrap_or(0),
        }
    }
}

/// Writes the exception vectors, clears the status register, and pulses
/// reset (`spec.md` §4.5 "CPU bootstrap after load").
fn bootstrap<C: Cpu>(cpu: &mut C, env: &mut MinixEnv) {
    env.ram.write32(0x000, STACK_BASE);
    env.ram.write32(0x004, EXEC_BASE);
    cpu.write_register(Register::Sr, 0);
    cpu.reset(&mut env.ram);
}

fn run_quantum<C: Cpu>(cpu: &mut C, env: &mut MinixEnv) {
    match cpu.run(&mut env.ram, QUANTUM_CYCLES) {
        StopReason::Trap(0) => handle_trap(cpu, env),
        // Only vector 0 is handled; any other vector is passed through to
        // whatever default handling the emulator itself provides
        // (`spec.md` §6).
        StopReason::Trap(_) | StopReason::QuantumExpired => {}
    }
}

fn handle_trap<C: Cpu>(cpu: &mut C, env: &mut MinixEnv) {
    let func = cpu.read_register(Register::D0) & 0xFFFF;
    let src_dest = cpu.read_register(Register::D1) as i16;
    let a0 = cpu.read_register(Register::A0);

    let wire = env.ram.block_to_host(a0, MESSAGE_SIZE);
    let mut msg = Message::from_wire_bytes(&wire);

    let d0 = dispatch::dispatch(env, func, src_dest, &mut msg);

    if func == dispatch::func::SEND_AND_RECEIVE {
        env.ram.block_from_host(a0, msg.as_wire_bytes());
    }
    cpu.write_register(Register::D0, d0.encode());
}

/// Delivers at most one pending signal by simulating a call into the
/// guest handler: push the current PC as a return address onto the
/// guest's own stack, then redirect PC to the handler (`spec.md` §4.5,
/// §5). The host signal context itself never touches the guest.
fn deliver_pending_signal<C: Cpu>(cpu: &mut C, env: &mut MinixEnv) {
    let Some(host_sig) = signal::take_pending_host_signal() else {
        return;
    };
    let Some(guest_sig) = signal::host_to_guest_signal(host_sig) else {
        return;
    };
    let Some(handler) = env.signals.handler(guest_sig) else {
        return;
    };
    if handler == signal::HANDLER_DFL || handler == signal::HANDLER_IGN {
        return;
    }

    let sp = cpu.read_register(Register::Ssp);
    let return_pc = cpu.read_register(Register::Pc);
    let new_sp = sp.wrapping_sub(4);
    env.ram.write32(new_sp, return_pc);
    cpu.write_register(Register::Ssp, new_sp);
    cpu.write_register(Register::Pc, handler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::StubCpu;
    use crate::fs::Filesystem;

    fn minimal_executable() -> Vec<u8> {
        let mut bytes = Vec::new();
        for field in [crate::loader::MAGIC_SEPARATE, crate::loader::FLAGS_REQUIRED, 0u32, 0, 0, 0, 256, 0] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        bytes
    }

    fn staged_env(dir: &tempfile::TempDir) -> MinixEnv {
        std::fs::write(dir.path().join("prog"), minimal_executable()).unwrap();
        let fs = Filesystem::new(dir.path().to_path_buf(), Some("/".to_string()));
        MinixEnv::new(fs, unsafe { libc::getpid() })
    }

    #[test]
    fn ready_state_bootstraps_cpu_registers() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = staged_env(&dir);
        let mut cpu = StubCpu::new();

        exec::startup(&mut env, "/prog", &[]).unwrap();
        env.transition(ExecState::Ready);
        bootstrap(&mut cpu, &mut env);

        assert_eq!(cpu.read_register(Register::Ssp), STACK_BASE);
        assert_eq!(cpu.read_register(Register::Pc), EXEC_BASE);
    }

    #[test]
    fn run_to_completion_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = staged_env(&dir);
        let mut cpu = StubCpu::new();

        // Script: quantum expires once, then a trap fires for `exit(9)`.
        let mut exit_msg = Message::zeroed();
        exit_msg.set_m_type(dispatch::EXIT);
        exit_msg.mess1_mut().set_i1(9);

        exec::startup(&mut env, "/prog", &[]).unwrap();
        env.transition(ExecState::Ready);
        bootstrap(&mut cpu, &mut env);
        env.transition(ExecState::Running);

        let a0 = 0x0020_0000;
        env.ram.block_from_host(a0, exit_msg.as_wire_bytes());
        cpu.write_register(Register::D0, dispatch::func::SEND);
        cpu.write_register(Register::D1, 0);
        cpu.write_register(Register::A0, a0);
        cpu.script.push_back(StopReason::Trap(0));

        run_quantum(&mut cpu, &mut env);
        assert_eq!(env.state(), ExecState::Finished);
        assert_eq!(env.exit_status, Some(9));
    }

    #[test]
    fn pending_signal_redirects_pc_and_pushes_return_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = staged_env(&dir);
        let mut cpu = StubCpu::new();
        exec::startup(&mut env, "/prog", &[]).unwrap();
        env.transition(ExecState::Ready);
        bootstrap(&mut cpu, &mut env);
        env.transition(ExecState::Running);

        cpu.write_register(Register::Pc, 0x0020_1000);
        env.signals.install(16, 0x0030_0000);
        unsafe {
            libc::raise(signal::guest_to_host_signal(16));
        }

        deliver_pending_signal(&mut cpu, &mut env);
        assert_eq!(cpu.read_register(Register::Pc), 0x0030_0000);
        let pushed_sp = cpu.read_register(Register::Ssp);
        assert_eq!(env.ram.read32(pushed_sp), 0x0020_1000);

        env.signals.install(16, signal::HANDLER_DFL);
    }
}
