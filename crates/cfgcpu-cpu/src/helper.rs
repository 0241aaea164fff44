//! `ExecutionHelper`: the single struct that owns every
//! subsystem an executing instruction can touch — register/flag state, the
//! memory bus, the instruction feeder, the breakpoint engine, and the
//! host's interrupt/port callback — and the one `step()` entry point that
//! ties fetch, breakpoint checks, CFG edge recording, and dispatch together.

use cfgcpu_breakpoints::{BreakpointsManager, EvalContext};
use cfgcpu_isa::{CfgInstruction, InstructionKind, Operand, SuccessorType, Width};
use cfgcpu_types::{SegmentedAddress, State};

use crate::bus::MemoryBus;
use crate::cfg::NodeId;
use crate::error::CpuFault;
use crate::feeder::InstructionsFeeder;
use crate::interrupt::{self, CallbackHandler};
use crate::model::CpuModelInfo;
use crate::modrm;
use crate::stack;
use crate::stats::Stats;

pub struct ExecutionHelper<B: MemoryBus, C: CallbackHandler> {
    pub state: State,
    pub bus: B,
    pub feeder: InstructionsFeeder,
    pub breakpoints: BreakpointsManager,
    pub callback_handler: C,
    pub model: CpuModelInfo,
    pub stats: Stats,
    /// The previously-fetched node, so the next `fetch` can record a CFG
    /// edge from it.
    next_node: Option<NodeId>,
}

/// Borrows `state`/`bus` read-only for the duration of a breakpoint
/// condition evaluation, kept as a distinct type (rather than an inherent
/// `impl EvalContext for ExecutionHelper`) so constructing it never needs a
/// borrow of the whole helper — only of the two fields a condition
/// expression can actually reference.
struct StepEvalContext<'a, B: MemoryBus> {
    state: &'a State,
    bus: &'a B,
}

impl<'a, B: MemoryBus> EvalContext for StepEvalContext<'a, B> {
    fn register(&self, name: &str) -> Option<i64> {
        register_by_name(self.state, name)
    }

    fn read_memory_sneaky(&self, address: u32, width: u8) -> u32 {
        match width {
            1 => self.bus.read_u8_sneaky(address) as u32,
            2 => {
                let lo = self.bus.read_u8_sneaky(address) as u32;
                let hi = self.bus.read_u8_sneaky(address.wrapping_add(1)) as u32;
                lo | (hi << 8)
            }
            4 => {
                let mut v = 0u32;
                for i in 0..4 {
                    v |= (self.bus.read_u8_sneaky(address.wrapping_add(i)) as u32) << (i * 8);
                }
                v
            }
            _ => 0,
        }
    }
}

/// Looks up a register or flag by its lowercase assembly name, for the
/// breakpoint condition-expression language.
fn register_by_name(state: &State, name: &str) -> Option<i64> {
    use cfgcpu_types::{Reg16, Reg32, Reg8, SegReg};
    Some(match name {
        "eax" => state.get32(Reg32::Eax) as i64,
        "ecx" => state.get32(Reg32::Ecx) as i64,
        "edx" => state.get32(Reg32::Edx) as i64,
        "ebx" => state.get32(Reg32::Ebx) as i64,
        "esp" => state.get32(Reg32::Esp) as i64,
        "ebp" => state.get32(Reg32::Ebp) as i64,
        "esi" => state.get32(Reg32::Esi) as i64,
        "edi" => state.get32(Reg32::Edi) as i64,
        "ax" => state.get16(Reg16::Ax) as i64,
        "cx" => state.get16(Reg16::Cx) as i64,
        "dx" => state.get16(Reg16::Dx) as i64,
        "bx" => state.get16(Reg16::Bx) as i64,
        "sp" => state.get16(Reg16::Sp) as i64,
        "bp" => state.get16(Reg16::Bp) as i64,
        "si" => state.get16(Reg16::Si) as i64,
        "di" => state.get16(Reg16::Di) as i64,
        "al" => state.get8(Reg8::Al) as i64,
        "cl" => state.get8(Reg8::Cl) as i64,
        "dl" => state.get8(Reg8::Dl) as i64,
        "bl" => state.get8(Reg8::Bl) as i64,
        "ah" => state.get8(Reg8::Ah) as i64,
        "ch" => state.get8(Reg8::Ch) as i64,
        "dh" => state.get8(Reg8::Dh) as i64,
        "bh" => state.get8(Reg8::Bh) as i64,
        "cs" => state.segment(SegReg::Cs) as i64,
        "ds" => state.segment(SegReg::Ds) as i64,
        "es" => state.segment(SegReg::Es) as i64,
        "ss" => state.segment(SegReg::Ss) as i64,
        "fs" => state.segment(SegReg::Fs) as i64,
        "gs" => state.segment(SegReg::Gs) as i64,
        "ip" => state.ip() as i64,
        "eip" => state.eip as i64,
        "cf" => state.flags.carry() as i64,
        "pf" => state.flags.parity() as i64,
        "af" => state.flags.auxiliary() as i64,
        "zf" => state.flags.zero() as i64,
        "sf" => state.flags.sign() as i64,
        "tf" => state.flags.trap() as i64,
        "if" => state.flags.interrupt() as i64,
        "df" => state.flags.direction() as i64,
        "of" => state.flags.overflow() as i64,
        _ => return None,
    })
}

/// The CFG edge type a just-executed instruction's *outgoing* edge should be
/// tagged with: `CallToRet` is reserved for a `RET`'s dynamically-matched
/// transfer back to its caller, not a `CALL`'s forward edge to its callee.
fn successor_type_for(instr: &CfgInstruction) -> SuccessorType {
    match &instr.kind {
        InstructionKind::Int { .. } | InstructionKind::IntO => SuccessorType::InterruptCall,
        InstructionKind::Iret { .. } => SuccessorType::InterruptRet,
        InstructionKind::RetNear { .. } | InstructionKind::RetFar { .. } => SuccessorType::CallToRet,
        InstructionKind::JmpNear { .. }
        | InstructionKind::JmpFar { .. }
        | InstructionKind::CallNear { .. }
        | InstructionKind::CallFar { .. }
        | InstructionKind::Jcc { .. }
        | InstructionKind::Jcxz { .. }
        | InstructionKind::Loop { .. } => SuccessorType::Jump,
        _ => SuccessorType::Normal,
    }
}

impl<B: MemoryBus, C: CallbackHandler> ExecutionHelper<B, C> {
    pub fn new(state: State, bus: B, callback_handler: C) -> Self {
        ExecutionHelper {
            state,
            bus,
            feeder: InstructionsFeeder::new(),
            breakpoints: BreakpointsManager::new(),
            callback_handler,
            model: CpuModelInfo::default(),
            stats: Stats::new(),
            next_node: None,
        }
    }

    fn eval_context(&self) -> StepEvalContext<'_, B> {
        StepEvalContext {
            state: &self.state,
            bus: &self.bus,
        }
    }

    /// Fetches, records the CFG edge from the previous step, and executes
    /// one instruction. Returns `Ok(())` having already converted any
    /// guest-observable fault (`InvalidOpcode`/`DivideError`) into an
    /// interrupt delivery; host-internal faults propagate to the caller,
    /// who is expected to stop the machine.
    pub fn step(&mut self) -> Result<(), CpuFault> {
        {
            let eval = self.eval_context();
            let eip = self.state.eip as u64;
            let cycles = self.stats.instructions_executed;
            self.breakpoints.check_execution(|| eip, cycles, &eval);
        }

        let addr = self.state.cs_ip();
        let node_id = self.feeder.fetch(
            addr,
            &self.bus,
            self.state.default_operand_size_32,
            self.state.default_operand_size_32,
            &mut self.stats,
        );

        if let Some(prev) = self.next_node {
            if let Some(prev_instr) = self.feeder.arena().instruction(prev) {
                let ty = successor_type_for(prev_instr);
                self.feeder.arena_mut().record_successor(prev, ty, addr, node_id);
            }
        }

        let instr = self
            .feeder
            .arena()
            .instruction(node_id)
            .cloned()
            .ok_or_else(|| CpuFault::CacheInvariantViolation {
                detail: "fetched node does not hold an instruction".into(),
            })?;

        self.state.set_ip(instr.next_in_memory_address().offset);
        self.stats.instructions_executed += 1;
        self.next_node = Some(node_id);

        if let Err(fault) = crate::execute::execute(self, &instr) {
            match fault.guest_vector() {
                Some(vector) => {
                    self.raise_interrupt(vector);
                    Ok(())
                }
                None => Err(fault),
            }
        } else {
            Ok(())
        }
    }

    /// Reads an operand's value, resolving memory through the bus.
    pub fn read_operand(&mut self, op: &Operand, width: Width) -> u32 {
        modrm::read(&self.state, &mut self.bus, op, width)
    }

    /// Writes an operand's value. For a memory destination this follows the
    /// §5 write ordering exactly: run the write-breakpoint holder, then
    /// evict any cached instruction the write overlaps, then perform the
    /// write — so a self-modifying write is visible to the feeder before
    /// the bytes it invalidated could otherwise be re-fetched stale.
    pub fn write_operand(&mut self, op: &Operand, width: Width, value: u32) {
        if let Operand::Mem(ctx) = op {
            let addr = modrm::effective_address(ctx, &self.state);
            let linear = addr.linear();
            {
                let eval = self.eval_context();
                self.breakpoints.monitor_write(linear as u64, &eval);
            }
            self.feeder.notify_write(linear, width.bits() / 8, &mut self.stats);
        }
        modrm::write(&mut self.state, &mut self.bus, op, width, value);
    }

    /// A raw memory write outside of operand write-back (string-op stores,
    /// PUSH/POP's implicit stack write) that must still follow the same SMC
    /// ordering.
    pub fn write_mem(&mut self, addr: SegmentedAddress, width_bits: u32, value: u32) {
        let linear = addr.linear();
        {
            let eval = self.eval_context();
            self.breakpoints.monitor_write(linear as u64, &eval);
        }
        self.feeder.notify_write(linear, width_bits / 8, &mut self.stats);
        self.bus.write_sized(addr, width_bits, value);
    }

    pub fn read_mem(&mut self, addr: SegmentedAddress, width_bits: u32) -> u32 {
        let linear = addr.linear();
        let eval = self.eval_context();
        self.breakpoints.monitor_read(linear as u64, &eval);
        drop(eval);
        self.bus.read_sized(addr, width_bits)
    }

    pub fn push(&mut self, use_32: bool, value: u32) {
        stack::push(&mut self.state, &mut self.bus, use_32, value);
    }

    pub fn pop(&mut self, use_32: bool) -> u32 {
        stack::pop(&mut self.state, &mut self.bus, use_32)
    }

    /// Delivers `vector`, first giving the host callback a chance to
    /// service it directly, then checking the
    /// interrupt breakpoint holder, then dispatching through the IVT.
    pub fn raise_interrupt(&mut self, vector: u8) {
        if self.callback_handler.handle(vector, &mut self.state, &mut self.bus) {
            return;
        }
        {
            let eval = self.eval_context();
            self.breakpoints.check_interrupt(vector, &eval);
        }
        self.stats.interrupts_dispatched += 1;
        interrupt::deliver(&mut self.state, &mut self.bus, vector);
    }

    pub fn return_from_interrupt(&mut self, width32: bool) {
        interrupt::return_from_interrupt(&mut self.state, &mut self.bus, width32);
    }

    pub fn port_in(&mut self, port: u16, width: Width) -> u32 {
        self.callback_handler.port_in(port, width.bits()) & width.mask()
    }

    pub fn port_out(&mut self, port: u16, width: Width, value: u32) {
        self.callback_handler.port_out(port, width.bits(), value & width.mask());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::VecMemoryBus;
    use cfgcpu_types::Reg16;

    #[test]
    fn stepping_a_nop_advances_ip_by_one() {
        let mut bus = VecMemoryBus::new(0x10000);
        bus.seed(0, &[0x90, 0x90]);
        let mut helper = ExecutionHelper::new(State::new(), bus, crate::interrupt::NullCallbackHandler);
        helper.step().unwrap();
        assert_eq!(helper.state.ip(), 1);
        helper.step().unwrap();
        assert_eq!(helper.state.ip(), 2);
        assert_eq!(helper.stats.instructions_executed, 2);
    }

    #[test]
    fn an_invalid_opcode_raises_interrupt_6() {
        let mut bus = VecMemoryBus::new(0x10000);
        bus.seed(0, &[0x0F, 0xFF]); // not a recognized two-byte opcode
        let mut state = State::new();
        state.set16(Reg16::Sp, 0x1000);
        let mut helper = ExecutionHelper::new(state, bus, crate::interrupt::NullCallbackHandler);
        crate::interrupt::InterruptVectorTable::set_vector(&mut helper.bus, 6, 0x2000, 0x0010);
        helper.step().unwrap();
        assert_eq!(helper.state.segment(cfgcpu_types::SegReg::Cs), 0x2000);
        assert_eq!(helper.state.ip(), 0x0010);
    }
}
