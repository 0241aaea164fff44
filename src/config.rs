//! `MachineConfig`: everything needed to stand a [`crate::Machine`] up before the first
//! `step` — initial register values, an interrupt-vector seed table, and a
//! breakpoint list to preload. Plain data, `serde`-derived so a host process
//! can load one from JSON/TOML; no env/file parsing lives in this crate
//! (that belongs to the excluded UI/runtime collaborator).

use cfgcpu_breakpoints::BreakPointRecord;
use cfgcpu_types::{Reg16, SegReg, State};
use serde::{Deserialize, Serialize};

/// The handful of registers a loader typically wants to seed before letting
/// the guest run: the entry point (`CS:IP`), the initial stack (`SS:SP`),
/// and `DS`/`ES` (real-mode DOS `.COM`/`.EXE` loaders always set these to
/// the program segment before transferring control).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialRegisters {
    pub cs: u16,
    pub ip: u16,
    pub ss: u16,
    pub sp: u16,
    pub ds: u16,
    pub es: u16,
    /// Raw initial `EFLAGS` value; `Default` matches `Flags::new()` (only
    /// the architecturally-reserved bit 1 set, interrupts off).
    pub flags: u32,
}

impl Default for InitialRegisters {
    fn default() -> Self {
        InitialRegisters {
            cs: 0,
            ip: 0,
            ss: 0,
            sp: 0xFFFE,
            ds: 0,
            es: 0,
            flags: cfgcpu_types::Flags::new().0,
        }
    }
}

impl InitialRegisters {
    pub fn apply(&self, state: &mut State) {
        state.set_segment(SegReg::Cs, self.cs);
        state.set_ip(self.ip);
        state.set_segment(SegReg::Ss, self.ss);
        state.set16(Reg16::Sp, self.sp);
        state.set_segment(SegReg::Ds, self.ds);
        state.set_segment(SegReg::Es, self.es);
        state.flags = cfgcpu_types::Flags(self.flags);
        // GPRs are left at `State::new()`'s zero default here; a loader
        // that needs a seeded EAX/EBX/etc. sets `state_mut()` directly
        // after constructing the `Machine`.
    }
}

/// One `(vector, segment, offset)` interrupt-vector-table entry to seed
/// before the guest runs — typically the BIOS/DOS handlers an embedding
/// runtime's `CallbackHandler` expects to be able to `IRET` back out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvtEntry {
    pub vector: u8,
    pub segment: u16,
    pub offset: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineConfig {
    pub initial_registers: InitialRegisters,
    pub ivt_seed: Vec<IvtEntry>,
    pub breakpoints: Vec<BreakPointRecord>,
    /// A sizing hint for the feeder's caches — advisory only, since
    /// `InstructionsFeeder` grows its maps on demand; a host with a known
    /// working-set size can still use this to pre-size a snapshot buffer.
    pub feeder_capacity_hint: usize,
}
