//! Instruction dispatch: one `execute` function over
//! every `InstructionKind` variant, expressed against an `ExecutionHelper`
//! rather than as a method on each variant — a free function keeps the
//! match exhaustive and visible in one place instead of scattered across
//! per-variant `impl` blocks.

use cfgcpu_isa::{
    ArithOp, BcdOp, FarTarget, FlagCtlOp, InOutOp, InstructionKind, LoadFarPtrOp, LogicalOp, LoopKind, NearTarget,
    Operand, PortOperand, Reg32OrReg16, StringOpKind, Width,
};
use cfgcpu_types::{Reg16, Reg32, Reg8, SegReg, SegmentedAddress};

use crate::alu;
use crate::bus::MemoryBus;
use crate::error::CpuFault;
use crate::helper::ExecutionHelper;
use crate::interrupt::CallbackHandler;
use crate::modrm;

type Instr = cfgcpu_isa::CfgInstruction;

pub fn execute<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, instr: &Instr) -> Result<(), CpuFault> {
    match &instr.kind {
        InstructionKind::Arithmetic { op, dst, src, width } => {
            let a = h.read_operand(dst, *width);
            let b = h.read_operand(src, *width);
            let result = alu::arith(&mut h.state.flags, *width, *op, a, b);
            if *op != ArithOp::Cmp {
                h.write_operand(dst, *width, result);
            }
        }
        InstructionKind::IncDec { op, dst, width } => {
            let a = h.read_operand(dst, *width);
            let result = match op {
                cfgcpu_isa::IncDecOp::Inc => alu::inc_dec(&mut h.state.flags, *width, false, a),
                cfgcpu_isa::IncDecOp::Dec => alu::inc_dec(&mut h.state.flags, *width, true, a),
                cfgcpu_isa::IncDecOp::Neg => alu::neg(&mut h.state.flags, *width, a),
            };
            h.write_operand(dst, *width, result);
        }
        InstructionKind::Logical { op, dst, src, width } => {
            let a = h.read_operand(dst, *width);
            let b = h.read_operand(src, *width);
            let raw = match op {
                LogicalOp::And | LogicalOp::Test => a & b,
                LogicalOp::Or => a | b,
                LogicalOp::Xor => a ^ b,
            };
            let result = alu::logical(&mut h.state.flags, *width, raw);
            if *op != LogicalOp::Test {
                h.write_operand(dst, *width, result);
            }
        }
        InstructionKind::Not { dst, width } => {
            let a = h.read_operand(dst, *width);
            let result = alu::not(*width, a);
            h.write_operand(dst, *width, result);
        }
        InstructionKind::Shift { op, dst, count, width } => {
            let a = h.read_operand(dst, *width);
            let raw_count = resolve_shift_count(h, count);
            let result = alu::shift(&mut h.state.flags, *width, *op, a, raw_count);
            if raw_count & 0x1F != 0 {
                h.write_operand(dst, *width, result);
            }
        }
        InstructionKind::DoubleShift {
            op,
            dst,
            src,
            count,
            width,
        } => {
            let d = h.read_operand(dst, *width);
            let s = h.read_operand(src, *width);
            let raw_count = resolve_shift_count(h, count);
            let result = match op {
                cfgcpu_isa::DoubleShiftOp::Shld => alu::shld(&mut h.state.flags, *width, d, s, raw_count),
                cfgcpu_isa::DoubleShiftOp::Shrd => alu::shrd(&mut h.state.flags, *width, d, s, raw_count),
            };
            if raw_count & 0x1F != 0 {
                h.write_operand(dst, *width, result);
            }
        }
        InstructionKind::MulDiv { op, src, width } => execute_mul_div(h, *op, src, *width, instr)?,
        InstructionKind::ImulMulti { dst, src, imm, width } => execute_imul_multi(h, dst, src, *imm, *width),
        InstructionKind::Bcd(op) => execute_bcd(h, *op, instr)?,
        InstructionKind::Mov { dst, src, width } => {
            if matches!(dst, Operand::SegReg(SegReg::Cs)) {
                return Err(CpuFault::InvalidOpcode {
                    address: instr.address,
                    opcode_bytes: instr.raw_bytes.clone(),
                });
            }
            let v = h.read_operand(src, *width);
            h.write_operand(dst, *width, v);
        }
        InstructionKind::MovSx { dst, src, src_width } => {
            let raw = h.read_operand(src, *src_width) & src_width.mask();
            let bits = src_width.bits();
            let shift = 32 - bits;
            let extended = ((raw << shift) as i32 >> shift) as u32;
            write_reg32_or_16(h, dst, extended);
        }
        InstructionKind::MovZx { dst, src, src_width } => {
            let raw = h.read_operand(src, *src_width) & src_width.mask();
            write_reg32_or_16(h, dst, raw);
        }
        InstructionKind::Lea { dst, mem } => {
            let ea = modrm::load_effective_address(mem, &h.state);
            write_reg32_or_16(h, dst, ea);
        }
        InstructionKind::Lahf => {
            let ah = (h.state.flags.0 & 0xFF) as u8;
            h.state.set8(Reg8::Ah, ah);
        }
        InstructionKind::Sahf => {
            let ah = h.state.get8(Reg8::Ah);
            h.state.flags.0 = (h.state.flags.0 & 0xFFFF_FF00) | ah as u32;
        }
        InstructionKind::Xchg { a, b, width } => {
            let va = h.read_operand(a, *width);
            let vb = h.read_operand(b, *width);
            h.write_operand(a, *width, vb);
            h.write_operand(b, *width, va);
        }
        InstructionKind::Xlat => {
            let ds = h.state.segment(SegReg::Ds);
            let bx = h.state.get16(Reg16::Bx);
            let al = h.state.get8(Reg8::Al);
            let addr = SegmentedAddress::new(ds, bx.wrapping_add(al as u16));
            let v = h.read_mem(addr, 8);
            h.state.set8(Reg8::Al, v as u8);
        }
        InstructionKind::Bswap { reg } => {
            let v = h.state.get32(*reg);
            h.state.set32(*reg, v.swap_bytes());
        }
        InstructionKind::LoadFarPtr { op, dst, mem } => {
            let addr = modrm::effective_address(mem, &h.state);
            let far_offset = h.read_mem(addr, 16);
            let far_segment = h.read_mem(SegmentedAddress::new(addr.segment, addr.offset.wrapping_add(2)), 16);
            write_reg32_or_16(h, dst, far_offset);
            let target_seg = match op {
                LoadFarPtrOp::Les => SegReg::Es,
                LoadFarPtrOp::Lds => SegReg::Ds,
                LoadFarPtrOp::Lss => SegReg::Ss,
                LoadFarPtrOp::Lfs => SegReg::Fs,
                LoadFarPtrOp::Lgs => SegReg::Gs,
            };
            h.state.set_segment(target_seg, far_segment as u16);
        }
        InstructionKind::Push { src, width } => {
            let v = h.read_operand(src, *width);
            h.push(width.bits() == 32, v);
        }
        InstructionKind::Pop { dst, width } => {
            let v = h.pop(width.bits() == 32);
            h.write_operand(dst, *width, v);
        }
        InstructionKind::Pushf { width } => {
            let use_32 = width.bits() == 32;
            let v = if use_32 { h.state.flags.pushfd_value() } else { h.state.flags.0 & 0xFFFF };
            h.push(use_32, v);
        }
        InstructionKind::Popf { width } => {
            let use_32 = width.bits() == 32;
            let v = h.pop(use_32);
            if use_32 {
                h.state.flags = cfgcpu_types::Flags(v);
            } else {
                h.state.flags.0 = (h.state.flags.0 & 0xFFFF_0000) | (v & 0xFFFF);
            }
        }
        InstructionKind::Pusha { width } => execute_pusha(h, *width),
        InstructionKind::Popa { width } => execute_popa(h, *width),
        InstructionKind::Enter { alloc_size, nesting_level } => execute_enter(h, *alloc_size, *nesting_level),
        InstructionKind::Leave => {
            let bp = h.state.get32(Reg32::Ebp);
            h.state.set32(Reg32::Esp, bp);
            let v = h.pop(h.state.default_operand_size_32);
            h.state.set32(Reg32::Ebp, v);
        }
        InstructionKind::CallNear { target } => {
            let return_addr = h.state.ip();
            let dest = resolve_near_target(h, target, instr);
            h.push(h.state.default_operand_size_32, return_addr as u32);
            h.state.set_ip(dest);
        }
        InstructionKind::CallFar { target } => {
            let (seg, off) = resolve_far_target(h, target);
            h.push(h.state.default_operand_size_32, h.state.segment(SegReg::Cs) as u32);
            h.push(h.state.default_operand_size_32, h.state.ip() as u32);
            h.state.set_segment(SegReg::Cs, seg);
            h.state.set_ip(off);
        }
        InstructionKind::RetNear { pop_bytes } => {
            let ip = h.pop(h.state.default_operand_size_32);
            h.state.set_ip(ip as u16);
            adjust_sp(h, *pop_bytes);
        }
        InstructionKind::RetFar { pop_bytes } => {
            let ip = h.pop(h.state.default_operand_size_32);
            let cs = h.pop(h.state.default_operand_size_32);
            h.state.set_ip(ip as u16);
            h.state.set_segment(SegReg::Cs, cs as u16);
            adjust_sp(h, *pop_bytes);
        }
        InstructionKind::Jcc { cond, target_rel } => {
            if cond.evaluate(h.state.flags) {
                let next = h.state.ip();
                h.state.set_ip(next.wrapping_add(*target_rel as i16 as u16));
            }
        }
        InstructionKind::Jcxz { use_ecx, target_rel } => {
            let counter_is_zero = if *use_ecx {
                h.state.get32(Reg32::Ecx) == 0
            } else {
                h.state.get16(Reg16::Cx) == 0
            };
            if counter_is_zero {
                let next = h.state.ip();
                h.state.set_ip(next.wrapping_add(*target_rel as i16 as u16));
            }
        }
        InstructionKind::JmpNear { target } => {
            let dest = resolve_near_target(h, target, instr);
            h.state.set_ip(dest);
        }
        InstructionKind::JmpFar { target } => {
            let (seg, off) = resolve_far_target(h, target);
            h.state.set_segment(SegReg::Cs, seg);
            h.state.set_ip(off);
        }
        InstructionKind::Loop { kind, use_ecx, target_rel } => execute_loop(h, *kind, *use_ecx, *target_rel),
        InstructionKind::StringOp { op, width, rep, segment } => execute_string_op(h, *op, *width, *rep, *segment),
        InstructionKind::FlagControl(op) => execute_flag_control(h, *op),
        InstructionKind::Int { vector } => h.raise_interrupt(*vector),
        InstructionKind::IntO => {
            if h.state.flags.overflow() {
                h.raise_interrupt(4);
            }
        }
        InstructionKind::Iret { width } => h.return_from_interrupt(width.bits() == 32),
        InstructionKind::Salc => {
            let al = if h.state.flags.carry() { 0xFF } else { 0x00 };
            h.state.set8(Reg8::Al, al);
        }
        InstructionKind::Hlt => {
            h.state.is_running = false;
        }
        InstructionKind::FpuStub { op, mem } => execute_fpu_stub(h, *op, mem),
        InstructionKind::Cpuid => {
            if !h.model.has_cpuid {
                return Err(CpuFault::InvalidOpcode {
                    address: instr.address,
                    opcode_bytes: instr.raw_bytes.clone(),
                });
            }
        }
        InstructionKind::IoPort { op, port, width } => execute_io_port(h, *op, port, *width),
        InstructionKind::Nop => {}
        InstructionKind::InvalidOpcode { opcode_bytes } => {
            return Err(CpuFault::InvalidOpcode {
                address: instr.address,
                opcode_bytes: opcode_bytes.clone(),
            })
        }
    }
    Ok(())
}

fn resolve_shift_count<B: MemoryBus, C: CallbackHandler>(h: &ExecutionHelper<B, C>, count: &cfgcpu_isa::ShiftCount) -> u8 {
    match count {
        cfgcpu_isa::ShiftCount::One => 1,
        cfgcpu_isa::ShiftCount::Cl => h.state.get8(Reg8::Cl),
        cfgcpu_isa::ShiftCount::Imm(v) => *v,
    }
}

fn write_reg32_or_16<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, dst: &Reg32OrReg16, value: u32) {
    match dst {
        Reg32OrReg16::R16(r) => h.state.set16(*r, value as u16),
        Reg32OrReg16::R32(r) => h.state.set32(*r, value),
    }
}

fn execute_mul_div<B: MemoryBus, C: CallbackHandler>(
    h: &mut ExecutionHelper<B, C>,
    op: cfgcpu_isa::MulDivOp,
    src: &Operand,
    width: Width,
    instr: &Instr,
) -> Result<(), CpuFault> {
    use cfgcpu_isa::MulDivOp::*;
    let (lo_reg, hi_reg): (fn(&mut cfgcpu_types::State, u32), fn(&mut cfgcpu_types::State, u32)) = match width {
        Width::W8 => (
            |s, v| s.set16(Reg16::Ax, v as u16),
            |_, _| {},
        ),
        Width::W16 => (
            |s, v| s.set16(Reg16::Ax, v as u16),
            |s, v| s.set16(Reg16::Dx, v as u16),
        ),
        Width::W32 => (
            |s, v| s.set32(Reg32::Eax, v),
            |s, v| s.set32(Reg32::Edx, v),
        ),
    };
    let v = h.read_operand(src, width);
    match op {
        Mul | Imul => {
            let a = match width {
                Width::W8 => h.state.get8(Reg8::Al) as u32,
                Width::W16 => h.state.get16(Reg16::Ax) as u32,
                Width::W32 => h.state.get32(Reg32::Eax),
            };
            let (full, cf_of) = if op == Mul {
                alu::mul_unsigned(width, a, v)
            } else {
                alu::mul_signed(width, a, v)
            };
            let bits = width.bits();
            let low = full as u32 & width.mask();
            let high = (full >> bits) as u32 & width.mask();
            if width == Width::W8 {
                h.state.set16(Reg16::Ax, ((high as u16) << 8) | low as u16);
            } else {
                lo_reg(&mut h.state, low);
                hi_reg(&mut h.state, high);
            }
            h.state.flags.set_carry(cf_of);
            h.state.flags.set_overflow(cf_of);
        }
        Div | Idiv => {
            let result = if width == Width::W8 {
                let dividend = h.state.get16(Reg16::Ax) as u64;
                if op == Div {
                    alu::div_unsigned(width, dividend, v)
                } else {
                    let signed_dividend = dividend as i16 as i64;
                    alu::div_signed(width, signed_dividend, v as i8 as i32)
                }
            } else if width == Width::W16 {
                let dividend = ((h.state.get16(Reg16::Dx) as u64) << 16) | h.state.get16(Reg16::Ax) as u64;
                if op == Div {
                    alu::div_unsigned(width, dividend, v)
                } else {
                    let signed_dividend = dividend as i32 as i64;
                    alu::div_signed(width, signed_dividend, v as i16 as i32)
                }
            } else {
                let dividend = ((h.state.get32(Reg32::Edx) as u64) << 32) | h.state.get32(Reg32::Eax) as u64;
                if op == Div {
                    alu::div_unsigned(width, dividend, v)
                } else {
                    let signed_dividend = dividend as i64;
                    alu::div_signed(width, signed_dividend, v as i32)
                }
            };
            match result {
                Some((q, r)) => {
                    if width == Width::W8 {
                        h.state.set8(Reg8::Al, q as u8);
                        h.state.set8(Reg8::Ah, r as u8);
                    } else {
                        lo_reg(&mut h.state, q);
                        hi_reg(&mut h.state, r);
                    }
                }
                None => {
                    return Err(CpuFault::DivideError { address: instr.address });
                }
            }
        }
    }
    Ok(())
}

fn execute_imul_multi<B: MemoryBus, C: CallbackHandler>(
    h: &mut ExecutionHelper<B, C>,
    dst: &Reg32OrReg16,
    src: &Operand,
    imm: Option<i32>,
    width: Width,
) {
    let a = h.read_operand(src, width);
    let b = match imm {
        Some(i) => i as u32 & width.mask(),
        None => match dst {
            Reg32OrReg16::R16(r) => h.state.get16(*r) as u32,
            Reg32OrReg16::R32(r) => h.state.get32(*r),
        },
    };
    let (full, cf_of) = alu::mul_signed(width, a, b);
    let result = full as u32 & width.mask();
    write_reg32_or_16(h, dst, result);
    h.state.flags.set_carry(cf_of);
    h.state.flags.set_overflow(cf_of);
}

fn execute_bcd<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, op: BcdOp, instr: &Instr) -> Result<(), CpuFault> {
    match op {
        BcdOp::Aaa => {
            let (ax, af, cf) = alu::aaa(h.state.get16(Reg16::Ax), h.state.flags.auxiliary());
            h.state.set16(Reg16::Ax, ax);
            h.state.flags.set_auxiliary(af);
            h.state.flags.set_carry(cf);
            h.state.flags.set_szp(ax as u32, 16);
        }
        BcdOp::Aas => {
            let (ax, af, cf) = alu::aas(h.state.get16(Reg16::Ax), h.state.flags.auxiliary());
            h.state.set16(Reg16::Ax, ax);
            h.state.flags.set_auxiliary(af);
            h.state.flags.set_carry(cf);
            h.state.flags.set_szp(ax as u32, 16);
        }
        BcdOp::Daa => {
            let (al, cf, af) = alu::daa(h.state.get8(Reg8::Al), h.state.flags.carry(), h.state.flags.auxiliary());
            h.state.set8(Reg8::Al, al);
            h.state.flags.set_carry(cf);
            h.state.flags.set_auxiliary(af);
            h.state.flags.set_szp(al as u32, 8);
        }
        BcdOp::Das => {
            let (al, cf, af) = alu::das(h.state.get8(Reg8::Al), h.state.flags.carry(), h.state.flags.auxiliary());
            h.state.set8(Reg8::Al, al);
            h.state.flags.set_carry(cf);
            h.state.flags.set_auxiliary(af);
            h.state.flags.set_szp(al as u32, 8);
        }
        BcdOp::Aam { base } => match alu::aam(h.state.get8(Reg8::Al), base) {
            Some(ax) => {
                h.state.set16(Reg16::Ax, ax);
                h.state.flags.set_szp(ax as u32, 8);
            }
            None => return Err(CpuFault::DivideError { address: instr.address }),
        },
        BcdOp::Aad { base } => {
            let ax = alu::aad(h.state.get16(Reg16::Ax), base);
            h.state.set16(Reg16::Ax, ax);
            h.state.flags.set_szp(ax as u32, 8);
        }
    }
    Ok(())
}

fn execute_pusha<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, width: Width) {
    let use_32 = width.bits() == 32;
    let sp_before = if use_32 { h.state.get32(Reg32::Esp) } else { h.state.get16(Reg16::Sp) as u32 };
    let order = [Reg32::Eax, Reg32::Ecx, Reg32::Edx, Reg32::Ebx];
    for r in order {
        h.push(use_32, h.state.get32(r) & width.mask());
    }
    h.push(use_32, sp_before & width.mask());
    for r in [Reg32::Ebp, Reg32::Esi, Reg32::Edi] {
        h.push(use_32, h.state.get32(r) & width.mask());
    }
}

fn execute_popa<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, width: Width) {
    let use_32 = width.bits() == 32;
    for r in [Reg32::Edi, Reg32::Esi, Reg32::Ebp] {
        let v = h.pop(use_32);
        if use_32 {
            h.state.set32(r, v);
        } else {
            h.state.set16(reg16_of(r), v as u16);
        }
    }
    h.pop(use_32); // discarded SP slot
    for r in [Reg32::Ebx, Reg32::Edx, Reg32::Ecx, Reg32::Eax] {
        let v = h.pop(use_32);
        if use_32 {
            h.state.set32(r, v);
        } else {
            h.state.set16(reg16_of(r), v as u16);
        }
    }
}

fn reg16_of(r: Reg32) -> Reg16 {
    match r {
        Reg32::Eax => Reg16::Ax,
        Reg32::Ecx => Reg16::Cx,
        Reg32::Edx => Reg16::Dx,
        Reg32::Ebx => Reg16::Bx,
        Reg32::Esp => Reg16::Sp,
        Reg32::Ebp => Reg16::Bp,
        Reg32::Esi => Reg16::Si,
        Reg32::Edi => Reg16::Di,
    }
}

fn execute_enter<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, alloc_size: u16, nesting_level: u8) {
    let use_32 = h.state.default_operand_size_32;
    h.push(use_32, h.state.get32(Reg32::Ebp));
    let frame_ptr = if use_32 { h.state.get32(Reg32::Esp) } else { h.state.get16(Reg16::Sp) as u32 };
    let level = nesting_level & 0x1F;
    for i in 1..level {
        let bp = h.state.get32(Reg32::Ebp);
        let src = SegmentedAddress::new(h.state.segment(SegReg::Ss), bp.wrapping_sub(2 * i as u32) as u16);
        let v = h.read_mem(src, if use_32 { 32 } else { 16 });
        h.push(use_32, v);
    }
    if level > 0 {
        h.push(use_32, frame_ptr);
    }
    if use_32 {
        h.state.set32(Reg32::Ebp, frame_ptr);
        h.state.set32(Reg32::Esp, h.state.get32(Reg32::Esp).wrapping_sub(alloc_size as u32));
    } else {
        h.state.set16(Reg16::Bp, frame_ptr as u16);
        h.state.set16(Reg16::Sp, h.state.get16(Reg16::Sp).wrapping_sub(alloc_size));
    }
}

fn resolve_near_target<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, target: &NearTarget, instr: &Instr) -> u16 {
    match target {
        NearTarget::Relative(rel) => instr.next_in_memory_address().offset.wrapping_add(*rel as i16 as u16),
        NearTarget::Indirect(op) => {
            let width = if h.state.default_operand_size_32 { Width::W32 } else { Width::W16 };
            h.read_operand(op, width) as u16
        }
    }
}

fn resolve_far_target<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, target: &FarTarget) -> (u16, u16) {
    match target {
        FarTarget::Direct { segment, offset } => (*segment, *offset as u16),
        FarTarget::Indirect(mem) => {
            let addr = modrm::effective_address(mem, &h.state);
            let offset = h.read_mem(addr, 16) as u16;
            let segment = h.read_mem(SegmentedAddress::new(addr.segment, addr.offset.wrapping_add(2)), 16) as u16;
            (segment, offset)
        }
    }
}

fn adjust_sp<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, pop_bytes: u16) {
    if pop_bytes == 0 {
        return;
    }
    if h.state.default_operand_size_32 {
        h.state.set32(Reg32::Esp, h.state.get32(Reg32::Esp).wrapping_add(pop_bytes as u32));
    } else {
        h.state.set16(Reg16::Sp, h.state.get16(Reg16::Sp).wrapping_add(pop_bytes));
    }
}

fn execute_loop<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, kind: LoopKind, use_ecx: bool, target_rel: i8) {
    let counter = if use_ecx {
        let v = h.state.get32(Reg32::Ecx).wrapping_sub(1);
        h.state.set32(Reg32::Ecx, v);
        v
    } else {
        let v = h.state.get16(Reg16::Cx).wrapping_sub(1);
        h.state.set16(Reg16::Cx, v);
        v as u32
    };
    let take = match kind {
        LoopKind::Loop => counter != 0,
        LoopKind::Loope => counter != 0 && h.state.flags.zero(),
        LoopKind::Loopne => counter != 0 && !h.state.flags.zero(),
    };
    if take {
        let next = h.state.ip();
        h.state.set_ip(next.wrapping_add(target_rel as i16 as u16));
    }
}

fn execute_flag_control<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, op: FlagCtlOp) {
    match op {
        FlagCtlOp::Clc => h.state.flags.set_carry(false),
        FlagCtlOp::Stc => h.state.flags.set_carry(true),
        FlagCtlOp::Cmc => {
            let cf = h.state.flags.carry();
            h.state.flags.set_carry(!cf);
        }
        FlagCtlOp::Cld => h.state.flags.set_direction(false),
        FlagCtlOp::Std => h.state.flags.set_direction(true),
        FlagCtlOp::Cli => h.state.flags.set_interrupt(false),
        FlagCtlOp::Sti => h.state.flags.set_interrupt(true),
    }
}

fn execute_fpu_stub<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, op: cfgcpu_isa::FpuStubOp, mem: &Option<Operand>) {
    use cfgcpu_isa::FpuStubOp::*;
    match op {
        Fninit | Fwait => {}
        Fnstcw => {
            if let Some(dst) = mem {
                h.write_operand(dst, Width::W16, h.model.fpu_stub_control_word as u32);
            }
        }
        Fnstsw => {
            if let Some(dst) = mem {
                h.write_operand(dst, Width::W16, h.model.fpu_stub_status_word as u32);
            }
        }
    }
}

fn execute_io_port<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, op: InOutOp, port: &PortOperand, width: Width) {
    let port_no = match port {
        PortOperand::Imm(p) => *p as u16,
        PortOperand::Dx => h.state.get16(Reg16::Dx),
    };
    match op {
        InOutOp::In => {
            let v = h.port_in(port_no, width);
            match width {
                Width::W8 => h.state.set8(Reg8::Al, v as u8),
                Width::W16 => h.state.set16(Reg16::Ax, v as u16),
                Width::W32 => h.state.set32(Reg32::Eax, v),
            }
        }
        InOutOp::Out => {
            let v = match width {
                Width::W8 => h.state.get8(Reg8::Al) as u32,
                Width::W16 => h.state.get16(Reg16::Ax) as u32,
                Width::W32 => h.state.get32(Reg32::Eax),
            };
            h.port_out(port_no, width, v);
        }
    }
}

/// String instructions (`MOVS`/`CMPS`/`SCAS`/`LODS`/`STOS`/`INS`/`OUTS`),
/// looped under `REP`/`REPE`/`REPNE` here rather than one iteration per
/// `step()` call — simpler to reason about without a host-visible
/// "mid-rep" execution state, at the cost of a single `step()` being able
/// to take longer wall-clock time than other instructions.
fn execute_string_op<B: MemoryBus, C: CallbackHandler>(
    h: &mut ExecutionHelper<B, C>,
    op: StringOpKind,
    width: Width,
    rep: Option<cfgcpu_decoder::RepPrefix>,
    segment: SegReg,
) {
    let use_ecx = h.state.default_operand_size_32;
    let mut iterations: u64 = match rep {
        Some(_) => {
            if use_ecx {
                h.state.get32(Reg32::Ecx) as u64
            } else {
                h.state.get16(Reg16::Cx) as u64
            }
        }
        None => 1,
    };
    if iterations == 0 && rep.is_some() {
        return;
    }

    loop {
        string_op_step(h, op, width, segment);
        if rep.is_some() {
            let counter = if use_ecx {
                let v = h.state.get32(Reg32::Ecx).wrapping_sub(1);
                h.state.set32(Reg32::Ecx, v);
                v as u64
            } else {
                let v = h.state.get16(Reg16::Cx).wrapping_sub(1);
                h.state.set16(Reg16::Cx, v);
                v as u64
            };
            iterations = counter;
        }
        let stop_on_flag = match (rep, op) {
            (Some(cfgcpu_decoder::RepPrefix::RepE), StringOpKind::Cmps | StringOpKind::Scas) => !h.state.flags.zero(),
            (Some(cfgcpu_decoder::RepPrefix::RepNe), StringOpKind::Cmps | StringOpKind::Scas) => h.state.flags.zero(),
            _ => false,
        };
        if rep.is_none() || iterations == 0 || stop_on_flag {
            break;
        }
    }
}

fn string_op_step<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, op: StringOpKind, width: Width, segment: SegReg) {
    let use_32 = h.state.default_operand_size_32;
    let step = (width.bits() / 8) as u16;
    let delta: i32 = if h.state.flags.direction() { -(step as i32) } else { step as i32 };

    let advance_si = |h: &mut ExecutionHelper<B, C>| {
        if use_32 {
            h.state.set32(Reg32::Esi, h.state.get32(Reg32::Esi).wrapping_add(delta as u32));
        } else {
            h.state.set16(Reg16::Si, h.state.get16(Reg16::Si).wrapping_add(delta as i16 as u16));
        }
    };
    let advance_di = |h: &mut ExecutionHelper<B, C>| {
        if use_32 {
            h.state.set32(Reg32::Edi, h.state.get32(Reg32::Edi).wrapping_add(delta as u32));
        } else {
            h.state.set16(Reg16::Di, h.state.get16(Reg16::Di).wrapping_add(delta as i16 as u16));
        }
    };
    let si_addr = |h: &ExecutionHelper<B, C>| {
        let off = if use_32 { h.state.get32(Reg32::Esi) as u16 } else { h.state.get16(Reg16::Si) };
        SegmentedAddress::new(h.state.segment(segment), off)
    };
    let di_addr = |h: &ExecutionHelper<B, C>| {
        let off = if use_32 { h.state.get32(Reg32::Edi) as u16 } else { h.state.get16(Reg16::Di) };
        SegmentedAddress::new(h.state.segment(SegReg::Es), off)
    };

    match op {
        StringOpKind::Movs => {
            let v = h.read_mem(si_addr(h), width.bits());
            h.write_mem(di_addr(h), width.bits(), v);
            advance_si(h);
            advance_di(h);
        }
        StringOpKind::Cmps => {
            let a = h.read_mem(si_addr(h), width.bits());
            let b = h.read_mem(di_addr(h), width.bits());
            alu::arith(&mut h.state.flags, width, ArithOp::Cmp, a, b);
            advance_si(h);
            advance_di(h);
        }
        StringOpKind::Scas => {
            let al = accumulator(h, width);
            let b = h.read_mem(di_addr(h), width.bits());
            alu::arith(&mut h.state.flags, width, ArithOp::Cmp, al, b);
            advance_di(h);
        }
        StringOpKind::Lods => {
            let v = h.read_mem(si_addr(h), width.bits());
            set_accumulator(h, width, v);
            advance_si(h);
        }
        StringOpKind::Stos => {
            let v = accumulator(h, width);
            h.write_mem(di_addr(h), width.bits(), v);
            advance_di(h);
        }
        StringOpKind::Ins => {
            let port = h.state.get16(Reg16::Dx);
            let v = h.port_in(port, width);
            h.write_mem(di_addr(h), width.bits(), v);
            advance_di(h);
        }
        StringOpKind::Outs => {
            let port = h.state.get16(Reg16::Dx);
            let v = h.read_mem(si_addr(h), width.bits());
            h.port_out(port, width, v);
            advance_si(h);
        }
    }
}

fn accumulator<B: MemoryBus, C: CallbackHandler>(h: &ExecutionHelper<B, C>, width: Width) -> u32 {
    match width {
        Width::W8 => h.state.get8(Reg8::Al) as u32,
        Width::W16 => h.state.get16(Reg16::Ax) as u32,
        Width::W32 => h.state.get32(Reg32::Eax),
    }
}

fn set_accumulator<B: MemoryBus, C: CallbackHandler>(h: &mut ExecutionHelper<B, C>, width: Width, v: u32) {
    match width {
        Width::W8 => h.state.set8(Reg8::Al, v as u8),
        Width::W16 => h.state.set16(Reg16::Ax, v as u16),
        Width::W32 => h.state.set32(Reg32::Eax, v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::VecMemoryBus;
    use cfgcpu_types::State;

    fn new_helper() -> ExecutionHelper<VecMemoryBus, crate::interrupt::NullCallbackHandler> {
        let mut state = State::new();
        state.set16(Reg16::Sp, 0xF000);
        ExecutionHelper::new(state, VecMemoryBus::new(0x10000), crate::interrupt::NullCallbackHandler)
    }

    #[test]
    fn mov_al_immediate_round_trips() {
        let mut h = new_helper();
        h.bus.seed(0, &[0xB0, 0x42]); // MOV AL, 0x42
        h.step().unwrap();
        assert_eq!(h.state.get8(Reg8::Al), 0x42);
    }

    #[test]
    fn aaa_end_to_end_via_step() {
        let mut h = new_helper();
        h.state.set16(Reg16::Ax, 0x00FA);
        h.bus.seed(0, &[0x37]); // AAA
        h.step().unwrap();
        assert_eq!(h.state.get16(Reg16::Ax), 0x0100);
        assert!(h.state.flags.carry());
        assert!(h.state.flags.auxiliary());
    }

    #[test]
    fn bswap_reverses_byte_order() {
        let mut h = new_helper();
        h.state.set32(Reg32::Eax, 0x1122_3344);
        h.bus.seed(0, &[0x0F, 0xC8]); // BSWAP EAX
        h.step().unwrap();
        assert_eq!(h.state.get32(Reg32::Eax), 0x4433_2211);
    }

    #[test]
    fn call_then_ret_restores_ip() {
        let mut h = new_helper();
        // CALL rel16 +2 at 0000, landing on target at 0005; target is RET.
        h.bus.seed(0, &[0xE8, 0x02, 0x00, 0x90, 0x90, 0xC3]);
        h.step().unwrap(); // CALL
        assert_eq!(h.state.ip(), 0x0005);
        h.step().unwrap(); // RET
        assert_eq!(h.state.ip(), 0x0003);
    }

    #[test]
    fn self_modifying_code_is_picked_up_after_a_write() {
        let mut h = new_helper();
        // at 0000: MOV AL,1 ; at 0002: a byte that MOV [0002],imm8 rewrites
        // to MOV AL,2 before it is ever fetched the second time around.
        h.bus.seed(0, &[0xB0, 0x01]);
        h.step().unwrap();
        assert_eq!(h.state.get8(Reg8::Al), 1);
        h.state.set_ip(0);
        h.bus.write_u8(1, 0x02);
        h.step().unwrap();
        assert_eq!(h.state.get8(Reg8::Al), 2);
        assert_eq!(h.stats.smc_evictions, 1);
    }

    #[test]
    fn divide_by_zero_dispatches_interrupt_0() {
        let mut h = new_helper();
        crate::interrupt::InterruptVectorTable::set_vector(&mut h.bus, 0, 0x3000, 0x0040);
        h.state.set16(Reg16::Ax, 0x0000);
        h.state.set8(Reg8::Cl, 0);
        h.bus.seed(0, &[0xF6, 0xF1]); // DIV CL
        h.step().unwrap();
        assert_eq!(h.state.segment(SegReg::Cs), 0x3000);
        assert_eq!(h.state.ip(), 0x0040);
    }
}
