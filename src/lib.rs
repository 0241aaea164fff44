//! The CFG-caching x86 (80386-class) PC emulator core: instruction
//! parsing/caching with self-modifying-code support, a cyclic control-flow
//! graph, execution semantics, and the breakpoint engine.
//!
//! This crate is a thin facade over its five collaborators:
//! - [`cfgcpu_types`] — register/flags/address primitives shared by everyone.
//! - [`cfgcpu_decoder`] — the byte-level prefix/opcode/ModRM/SIB decoder.
//! - [`cfgcpu_isa`] — the tagged-variant instruction set, parsed from the
//!   decoder's output.
//! - [`cfgcpu_cpu`] — the CFG arena, the SMC-aware instruction feeder, and
//!   register/flag execution semantics ([`cfgcpu_cpu::ExecutionHelper`]).
//! - [`cfgcpu_breakpoints`] — the execution/memory/IO/interrupt/cycle
//!   breakpoint engine and its condition-expression language.
//!
//! [`Machine`] assembles all five into something a host process can drive:
//! load a [`MachineConfig`], `run` or single-`step`, pause it from another
//! thread through a [`PauseHandle`], and read back execution [`Stats`].

mod config;
mod machine;
mod pause;

pub use cfgcpu_breakpoints::{
    BreakPoint, BreakPointId, BreakPointKind, BreakPointRecord, BreakPointType, BreakpointsManager,
};
pub use cfgcpu_cpu::{
    CallbackHandler, CpuFault, CpuModelInfo, ExecutionHelper, InterruptVectorTable, MemoryBus, NullCallbackHandler,
    Stats,
};
pub use cfgcpu_isa::{parse, CfgInstruction, InstructionKind};
pub use cfgcpu_types::{Flags, Reg16, Reg32, Reg8, SegReg, SegmentedAddress, State};

pub use config::{InitialRegisters, IvtEntry, MachineConfig};
pub use machine::{InDos, Machine};
pub use pause::PauseHandle;

#[cfg(any(test, feature = "test-util"))]
pub use cfgcpu_cpu::test_util;

#[cfg(test)]
mod tests {
    use super::*;
    use cfgcpu_cpu::test_util::VecMemoryBus;

    /// Loads a tiny real-mode program through the full facade: config with
    /// a seeded IVT entry, a breakpoint import, then `run` to `HLT`.
    #[test]
    fn a_machine_built_from_config_runs_to_completion() {
        let mut bus = VecMemoryBus::new(0x1_0000);
        // mov ax, 0x0005 ; inc ax ; hlt
        bus.seed(0, &[0xB8, 0x05, 0x00, 0x40, 0xF4]);

        let config = MachineConfig {
            initial_registers: InitialRegisters::default(),
            ivt_seed: vec![IvtEntry {
                vector: 0x21,
                segment: 0xF000,
                offset: 0x1000,
            }],
            breakpoints: vec![BreakPointRecord {
                trigger: 3,
                end_trigger: 3,
                bp_type: BreakPointType::CpuExecutionAddress,
                is_enabled: true,
                condition: Some("ax == 0x0005".to_string()),
            }],
            feeder_capacity_hint: 0,
        };

        let mut machine = Machine::new(bus, NullCallbackHandler, &config);
        machine.run().unwrap();

        assert_eq!(machine.state().get16(Reg16::Ax), 6);
        assert!(!machine.state().is_running);
        assert_eq!(
            InterruptVectorTable::get_vector(machine.bus(), 0x21),
            (0xF000, 0x1000)
        );
        assert_eq!(machine.stats().instructions_executed, 3);
    }
}
