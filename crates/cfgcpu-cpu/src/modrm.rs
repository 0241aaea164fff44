//! Effective-address resolution and operand read/write. Turns
//! a structural `cfgcpu_isa::Operand` — resolved syntactically by the parser,
//! independent of any running register file — into an actual value read
//! from, or written to, `State`/the memory bus.

use cfgcpu_decoder::ModRmContext;
use cfgcpu_isa::{Operand, Width};
use cfgcpu_types::{Reg16, Reg32, Reg8, SegReg, SegmentedAddress, State};

use crate::bus::MemoryBus;

/// Computes the 16/32-bit effective offset a `ModRmContext`'s memory form
/// encodes, honouring base/index/scale/displacement.
pub fn effective_offset(ctx: &ModRmContext, state: &State) -> u32 {
    let mut offset: u32 = 0;
    if ctx.addr_size_32 {
        if let Some(base) = ctx.base32 {
            offset = offset.wrapping_add(state.get32(base));
        }
        if let Some((index, scale)) = ctx.index32 {
            offset = offset.wrapping_add(state.get32(index).wrapping_mul(scale as u32));
        }
        offset = offset.wrapping_add(ctx.disp as u32);
    } else {
        if let Some(base16) = ctx.base16 {
            for r in base16_registers(base16) {
                offset = offset.wrapping_add(state.get16(r) as u32);
            }
        }
        offset = (offset.wrapping_add(ctx.disp as u32)) & 0xFFFF;
    }
    offset
}

fn base16_registers(base: cfgcpu_decoder::Base16) -> &'static [Reg16] {
    use cfgcpu_decoder::Base16::*;
    match base {
        BxSi => &[Reg16::Bx, Reg16::Si],
        BxDi => &[Reg16::Bx, Reg16::Di],
        BpSi => &[Reg16::Bp, Reg16::Si],
        BpDi => &[Reg16::Bp, Reg16::Di],
        Si => &[Reg16::Si],
        Di => &[Reg16::Di],
        Bp => &[Reg16::Bp],
        Bx => &[Reg16::Bx],
    }
}

/// The segmented address a `ModRmContext`'s memory operand refers to, given
/// the current register file (segment overrides and the BP-defaults-to-SS
/// rule are already folded into `ModRmContext::effective_segment`).
pub fn effective_address(ctx: &ModRmContext, state: &State) -> SegmentedAddress {
    let offset = effective_offset(ctx, state);
    let segment = state.segment(ctx.effective_segment());
    let offset16 = if ctx.addr_size_32 { offset as u16 } else { offset as u16 };
    SegmentedAddress::new(segment, offset16)
}

/// Reads an `Operand`'s value, resolving memory operands through `bus` and
/// register operands through `state`. Relative/far-pointer operand variants
/// have no plain scalar reading — callers destructure those directly from
/// the `InstructionKind` payload instead.
pub fn read(state: &State, bus: &mut dyn MemoryBus, op: &Operand, width: Width) -> u32 {
    match op {
        Operand::Reg8(r) => state.get8(*r) as u32,
        Operand::Reg16(r) => state.get16(*r) as u32,
        Operand::Reg32(r) => state.get32(*r),
        Operand::SegReg(s) => state.segment(*s) as u32,
        Operand::Mem(ctx) => {
            let addr = effective_address(ctx, state);
            bus.read_sized(addr, width.bits())
        }
        Operand::Imm8(v) => *v as u32,
        Operand::Imm16(v) => *v as u32,
        Operand::Imm32(v) => *v,
        Operand::ImmS8(v) => *v as i32 as u32 & width.mask(),
        Operand::Rel8(v) => *v as i32 as u32,
        Operand::Rel16(v) => *v as i32 as u32,
        Operand::Rel32(v) => *v as u32,
        Operand::FarPtr16 { offset, .. } => *offset as u32,
    }
}

/// Writes `value` back to an `Operand`'s location. `SegReg` destinations are
/// structurally accepted by the parser (e.g. `MOV seg, r/m`) but writing
/// `CS` through this path is an invalid-opcode fault, checked by the caller
/// in `cfgcpu-cpu::execute` before reaching here.
pub fn write(state: &mut State, bus: &mut dyn MemoryBus, op: &Operand, width: Width, value: u32) {
    let value = value & width.mask();
    match op {
        Operand::Reg8(r) => state.set8(*r, value as u8),
        Operand::Reg16(r) => state.set16(*r, value as u16),
        Operand::Reg32(r) => state.set32(*r, value),
        Operand::SegReg(s) => state.set_segment(*s, value as u16),
        Operand::Mem(ctx) => {
            let addr = effective_address(ctx, state);
            bus.write_sized(addr, width.bits(), value);
        }
        Operand::Imm8(_)
        | Operand::Imm16(_)
        | Operand::Imm32(_)
        | Operand::ImmS8(_)
        | Operand::Rel8(_)
        | Operand::Rel16(_)
        | Operand::Rel32(_)
        | Operand::FarPtr16 { .. } => {
            unreachable!("the parser never produces an immediate/relative/far-pointer operand as a write destination")
        }
    }
}

/// `LEA`'s operand: the effective *address* itself, never dereferenced.
pub fn load_effective_address(ctx: &ModRmContext, state: &State) -> u32 {
    effective_offset(ctx, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::VecMemoryBus;
    use cfgcpu_decoder::{parse_modrm, Cursor};

    #[test]
    fn bx_plus_si_plus_disp8_resolves_against_live_registers() {
        let bytes = [0b01_000_000, 0x10]; // [bx+si+0x10]
        let mut c = Cursor::new(&bytes);
        let ctx = parse_modrm(&mut c, false, None).unwrap();
        let mut state = State::new();
        state.set16(Reg16::Bx, 0x0100);
        state.set16(Reg16::Si, 0x0004);
        assert_eq!(effective_offset(&ctx, &state), 0x0114);
    }

    #[test]
    fn thirty_two_bit_base_plus_scaled_index() {
        let bytes = [0b00_000_100, 0b10_001_011]; // SIB scale=4 index=ecx base=ebx
        let mut c = Cursor::new(&bytes);
        let ctx = parse_modrm(&mut c, true, None).unwrap();
        let mut state = State::new();
        state.set32(Reg32::Ebx, 0x1000);
        state.set32(Reg32::Ecx, 0x0002);
        assert_eq!(effective_offset(&ctx, &state), 0x1008);
    }

    #[test]
    fn memory_read_write_round_trips_through_the_bus() {
        let bytes = [0b00_000_110, 0x00, 0x02]; // disp16-only [0x0200]
        let mut c = Cursor::new(&bytes);
        let ctx = parse_modrm(&mut c, false, None).unwrap();
        let mut state = State::new();
        state.set_segment(SegReg::Ds, 0);
        let mut bus = VecMemoryBus::new(0x10000);
        let op = Operand::Mem(ctx);
        write(&mut state, &mut bus, &op, Width::W16, 0xBEEF);
        assert_eq!(read(&state, &mut bus, &op, Width::W16), 0xBEEF);
    }
}
