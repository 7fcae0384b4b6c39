//! # Guest CPU Interface
//!
//! The M68000 instruction decoder and bus are an external collaborator —
//! this crate never implements one. It only consumes a narrow interface:
//! reset, run a quantum, read/write a register, and learn when a trap
//! fired (`spec.md` §1).
//!
//! Real emulators usually expose the trap as an out-of-band callback
//! invoked from inside `run`. Modeling that directly in Rust means handing
//! the callback a mutable borrow of both the register file and guest RAM
//! while `run` itself also holds one, which is awkward without interior
//! mutability the rest of this crate avoids. Instead `run` simply *stops*
//! and reports why (quantum exhausted or a trap fired); the run loop
//! (`crate::runloop`) plays the role the callback would have, reading
//! registers, dispatching, writing the result, and resuming the quantum.
//! From the guest's point of view the effect is identical: the trap
//! handler runs synchronously before any further guest instruction does.

/// Registers the core needs to read or write across a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    D0,
    D1,
    A0,
    /// Supervisor stack pointer (A7 in supervisor mode).
    Ssp,
    Pc,
    Sr,
}

/// Why [`Cpu::run`] returned control to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The quantum ran to completion without a trap.
    QuantumExpired,
    /// A `TRAP #n` instruction executed; only vector 0 is handled by this
    /// crate (`spec.md` §6, "Trap ABI").
    Trap(u8),
}

/// The narrow interface this crate requires of a guest CPU emulator.
pub trait Cpu {
    /// Pulses reset: load the initial SSP and PC from the exception vector
    /// table at guest addresses `0x000`/`0x004`, clear the status
    /// register's trace/supervisor-transition bits as appropriate, and
    /// begin fetching at the new PC.
    fn reset(&mut self, ram: &mut crate::ram::GuestRam);

    /// Runs up to `cycles` worth of instructions, or until a trap fires.
    fn run(&mut self, ram: &mut crate::ram::GuestRam, cycles: u32) -> StopReason;

    fn read_register(&self, reg: Register) -> u32;
    fn write_register(&mut self, reg: Register, value: u32);
}

/// A minimal test double satisfying [`Cpu`] without implementing any real
/// M68000 semantics. It never advances `PC` or decodes instructions; it
/// exists only so this crate's own tests can exercise the run loop and
/// dispatcher without a real emulator. Production use requires wiring in
/// an actual M68000 core.
#[cfg(test)]
pub struct StubCpu {
    pub registers: [u32; 6],
    /// Queue of stop reasons `run` returns, one per call; once exhausted,
    /// returns `QuantumExpired` forever.
    pub script: std::collections::VecDeque<StopReason>,
}

#[cfg(test)]
impl StubCpu {
    pub fn new() -> Self {
        Self {
            registers: [0; 6],
            script: std::collections::VecDeque::new(),
        }
    }

    fn index(reg: Register) -> usize {
        match reg {
            Register::D0 => 0,
            Register::D1 => 1,
            Register::A0 => 2,
            Register::Ssp => 3,
            Register::Pc => 4,
            Register::Sr => 5,
        }
    }
}

#[cfg(test)]
impl Cpu for StubCpu {
    fn reset(&mut self, ram: &mut crate::ram::GuestRam) {
        let ssp = ram.read32(0x000);
        let pc = ram.read32(0x004);
        self.write_register(Register::Ssp, ssp);
        self.write_register(Register::Pc, pc);
        self.write_register(Register::Sr, 0);
    }

    fn run(&mut self, _ram: &mut crate::ram::GuestRam, _cycles: u32) -> StopReason {
        self.script.pop_front().unwrap_or(StopReason::QuantumExpired)
    }

    fn read_register(&self, reg: Register) -> u32 {
        self.registers[Self::index(reg)]
    }

    fn write_register(&mut self, reg: Register, value: u32) {
        self.registers[Self::index(reg)] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::GuestRam;

    #[test]
    fn reset_loads_ssp_and_pc_from_vector_table() {
        let mut ram = GuestRam::new();
        ram.write32(0x000, 0x00FF_0000);
        ram.write32(0x004, 0x0010_00);
        let mut cpu = StubCpu::new();
        cpu.reset(&mut ram);
        assert_eq!(cpu.read_register(Register::Ssp), 0x00FF_0000);
        assert_eq!(cpu.read_register(Register::Pc), 0x0010_00);
    }

    #[test]
    fn scripted_run_reports_trap_then_quantum_expired() {
        let mut ram = GuestRam::new();
        let mut cpu = StubCpu::new();
        cpu.script.push_back(StopReason::Trap(0));
        assert_eq!(cpu.run(&mut ram, 10_000), StopReason::Trap(0));
        assert_eq!(cpu.run(&mut ram, 10_000), StopReason::QuantumExpired);
    }
}
