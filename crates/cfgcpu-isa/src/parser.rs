//! The `InstructionParser`: turns a byte window at a segmented address into
//! exactly one `CfgInstruction`. Parsing never fails — an
//! unrecognized or truncated encoding becomes `InstructionKind::InvalidOpcode`
//! rather than an `Err`, so the feeder can always cache *something* for an
//! address.

use crate::instruction::{CfgInstruction, FieldRole, RawField};
use crate::kind::*;
use crate::operand::{Operand, Width};
use cfgcpu_decoder::{parse_modrm, parse_prefixes, Cursor, DecodeError, ModRmContext, PrefixSet};
use cfgcpu_types::{Reg16, Reg32, Reg8, SegReg, SegmentedAddress};

/// Tracks byte-offset bookkeeping while the opcode table consumes a `Cursor`,
/// recording each consumed range as a `RawField`.
struct Builder<'a> {
    cursor: Cursor<'a>,
    address: SegmentedAddress,
    fields: Vec<RawField>,
}

impl<'a> Builder<'a> {
    fn new(bytes: &'a [u8], address: SegmentedAddress) -> Self {
        Builder {
            cursor: Cursor::new(bytes),
            address,
            fields: Vec::with_capacity(4),
        }
    }

    fn push(&mut self, role: FieldRole, start: usize, end: usize, is_final: bool) {
        if end <= start {
            return;
        }
        self.fields.push(RawField::new(
            self.address.advance(start as u16),
            (end - start) as u8,
            role,
            is_final,
        ));
    }

    fn prefixes(&mut self) -> Result<PrefixSet, DecodeError> {
        let start = self.cursor.position();
        let p = parse_prefixes(&mut self.cursor)?;
        self.push(FieldRole::Prefix, start, self.cursor.position(), true);
        Ok(p)
    }

    fn opcode_byte(&mut self) -> Result<u8, DecodeError> {
        let start = self.cursor.position();
        let b = self.cursor.read_u8()?;
        self.push(FieldRole::Opcode, start, self.cursor.position(), true);
        Ok(b)
    }

    fn modrm(&mut self, addr_size_32: bool, seg_override: Option<SegReg>) -> Result<ModRmContext, DecodeError> {
        let start = self.cursor.position();
        let ctx = parse_modrm(&mut self.cursor, addr_size_32, seg_override)?;
        // The ModRM + SIB bytes are final (part of the instruction's
        // identity); any trailing displacement is not.
        let disp_start = self.cursor.position() - ctx.disp_size as usize;
        self.push(FieldRole::ModRm, start, disp_start, true);
        self.push(FieldRole::Displacement, disp_start, self.cursor.position(), false);
        Ok(ctx)
    }

    fn imm(&mut self, n: u8) -> Result<u64, DecodeError> {
        let start = self.cursor.position();
        let v = self.cursor.read_sized(n)?;
        self.push(FieldRole::Immediate, start, self.cursor.position(), false);
        Ok(v)
    }

    fn len(&self) -> u8 {
        self.cursor.position() as u8
    }
}

/// Decodes one `CfgInstruction` at `address` from `bytes` (a fetch window
/// sliced from the flat memory image — typically 16 bytes, the
/// architectural maximum instruction length).
///
/// `default_operand_size_32`/`default_address_size_32` reflect the current
/// code segment's default (always `false`/16-bit for this real-mode-only
/// core, but threaded through so a future protected-mode extension doesn't
/// need to touch every call site).
pub fn parse(
    bytes: &[u8],
    address: SegmentedAddress,
    default_operand_size_32: bool,
    default_address_size_32: bool,
) -> CfgInstruction {
    let mut b = Builder::new(bytes, address);
    match parse_inner(&mut b, default_operand_size_32, default_address_size_32) {
        Ok((prefixes, kind)) => finish(b, bytes, prefixes, kind),
        Err(_) => {
            // Truncated or malformed stream: synthesize a minimal invalid
            // instruction covering whatever was actually consumed (at least
            // one byte), so callers always get a non-empty `CfgInstruction`.
            let consumed = b.len().max(1);
            let raw_bytes = bytes.get(..consumed as usize).unwrap_or(&[]).to_vec();
            CfgInstruction {
                address,
                prefixes: PrefixSet::default(),
                fields: vec![RawField::new(address, consumed, FieldRole::Opcode, true)],
                kind: InstructionKind::InvalidOpcode {
                    opcode_bytes: raw_bytes.clone(),
                },
                length: consumed,
                raw_bytes,
            }
        }
    }
}

fn finish(b: Builder<'_>, bytes: &[u8], prefixes: PrefixSet, kind: InstructionKind) -> CfgInstruction {
    let length = b.len();
    CfgInstruction {
        address: b.address,
        prefixes,
        fields: b.fields,
        kind,
        length,
        raw_bytes: bytes.get(..length as usize).unwrap_or(&[]).to_vec(),
    }
}

fn width_for(prefixes: &PrefixSet, default_operand_size_32: bool) -> Width {
    let is_32 = default_operand_size_32 != prefixes.operand_size_override;
    if is_32 {
        Width::W32
    } else {
        Width::W16
    }
}

fn addr_is_32(prefixes: &PrefixSet, default_address_size_32: bool) -> bool {
    default_address_size_32 != prefixes.address_size_override
}

fn reg_operand(width: Width, idx: u8) -> Operand {
    match width {
        Width::W8 => Operand::Reg8(Reg8::from_index(idx)),
        Width::W16 => Operand::Reg16(Reg16::from_index(idx)),
        Width::W32 => Operand::Reg32(Reg32::from_index(idx)),
    }
}

fn reg_or_mem(width: Width, ctx: ModRmContext) -> Operand {
    if ctx.is_memory {
        Operand::Mem(ctx)
    } else {
        reg_operand(width, ctx.rm_field)
    }
}

fn wide_reg(width: Width, idx: u8) -> Reg32OrReg16 {
    match width {
        Width::W32 => Reg32OrReg16::R32(Reg32::from_index(idx)),
        _ => Reg32OrReg16::R16(Reg16::from_index(idx)),
    }
}

fn moffs_operand(addr: u32, width: Width, addr_is_32: bool, seg: Option<SegReg>) -> Operand {
    let ctx = ModRmContext {
        raw: 0,
        mod_bits: 0,
        reg_field: 0,
        rm_field: if addr_is_32 { 0b101 } else { 0b110 },
        is_memory: true,
        base16: None,
        base32: None,
        index32: None,
        disp: addr as i32,
        disp_size: if addr_is_32 { 4 } else { 2 },
        addr_size_32: addr_is_32,
        segment_override: seg,
        byte_len: 0,
    };
    let _ = width;
    Operand::Mem(ctx)
}

fn parse_inner(
    b: &mut Builder<'_>,
    default_operand_size_32: bool,
    default_address_size_32: bool,
) -> Result<(PrefixSet, InstructionKind), DecodeError> {
    let prefixes = b.prefixes()?;
    let op_width = width_for(&prefixes, default_operand_size_32);
    let addr32 = addr_is_32(&prefixes, default_address_size_32);
    let seg = prefixes.segment_override;

    let op = b.opcode_byte()?;
    let kind = if op == 0x0F {
        parse_two_byte(b, &prefixes, op_width, addr32, seg)?
    } else {
        parse_one_byte(b, op, &prefixes, op_width, addr32, seg)?
    };
    Ok((prefixes, kind))
}

/// Decodes the six canonical forms of an ALU opcode block (`Eb,Gb` /
/// `Ev,Gv` / `Gb,Eb` / `Gv,Ev` / `AL,Ib` / `eAX,Iv`), shared by every one of
/// ADD/OR/ADC/SBB/AND/SUB/XOR/CMP's eight-opcode blocks.
fn decode_alu_forms(
    b: &mut Builder<'_>,
    base: u8,
    op: u8,
    op_width: Width,
    addr32: bool,
    seg: Option<SegReg>,
) -> Result<(Operand, Operand, Width), DecodeError> {
    let variant = op - base;
    Ok(match variant {
        0 => {
            // Eb, Gb
            let ctx = b.modrm(addr32, seg)?;
            (reg_or_mem(Width::W8, ctx), reg_operand(Width::W8, ctx.reg_field), Width::W8)
        }
        1 => {
            let ctx = b.modrm(addr32, seg)?;
            (reg_or_mem(op_width, ctx), reg_operand(op_width, ctx.reg_field), op_width)
        }
        2 => {
            let ctx = b.modrm(addr32, seg)?;
            (reg_operand(Width::W8, ctx.reg_field), reg_or_mem(Width::W8, ctx), Width::W8)
        }
        3 => {
            let ctx = b.modrm(addr32, seg)?;
            (reg_operand(op_width, ctx.reg_field), reg_or_mem(op_width, ctx), op_width)
        }
        4 => {
            let imm = b.imm(1)? as u8;
            (Operand::Reg8(Reg8::Al), Operand::Imm8(imm), Width::W8)
        }
        _ => {
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let imm = b.imm(n)?;
            let src = if op_width == Width::W32 {
                Operand::Imm32(imm as u32)
            } else {
                Operand::Imm16(imm as u16)
            };
            (reg_operand(op_width, 0), src, op_width)
        }
    })
}

fn parse_one_byte(
    b: &mut Builder<'_>,
    op: u8,
    prefixes: &PrefixSet,
    op_width: Width,
    addr32: bool,
    seg: Option<SegReg>,
) -> Result<InstructionKind, DecodeError> {
    // ALU blocks: ADD/OR/ADC/SBB/AND/SUB/XOR/CMP each occupy 8 opcodes
    // (0x00-0x3D in steps of 0x08), the last two of every block (0x0E/0x0F
    // etc.) being the segment PUSH/POP exception for the first two blocks.
    let block = op / 8;
    let within = op % 8;
    if op <= 0x3D && within <= 5 && block <= 7 {
        let base = block * 8;
        let (dst, src, width) = decode_alu_forms(b, base, op, op_width, addr32, seg)?;
        return Ok(match block {
            0 => InstructionKind::Arithmetic { op: ArithOp::Add, dst, src, width },
            1 => InstructionKind::Logical { op: LogicalOp::Or, dst, src, width },
            2 => InstructionKind::Arithmetic { op: ArithOp::Adc, dst, src, width },
            3 => InstructionKind::Arithmetic { op: ArithOp::Sbb, dst, src, width },
            4 => InstructionKind::Logical { op: LogicalOp::And, dst, src, width },
            5 => InstructionKind::Arithmetic { op: ArithOp::Sub, dst, src, width },
            6 => InstructionKind::Logical { op: LogicalOp::Xor, dst, src, width },
            _ => InstructionKind::Arithmetic { op: ArithOp::Cmp, dst, src, width },
        });
    }
    match op {
        0x27 => Ok(InstructionKind::Bcd(BcdOp::Daa)),
        0x2F => Ok(InstructionKind::Bcd(BcdOp::Das)),
        0x37 => Ok(InstructionKind::Bcd(BcdOp::Aaa)),
        0x3F => Ok(InstructionKind::Bcd(BcdOp::Aas)),

        0x06 => Ok(InstructionKind::Push { src: Operand::SegReg(SegReg::Es), width: op_width }),
        0x07 => Ok(InstructionKind::Pop { dst: Operand::SegReg(SegReg::Es), width: op_width }),
        0x0E => Ok(InstructionKind::Push { src: Operand::SegReg(SegReg::Cs), width: op_width }),
        0x16 => Ok(InstructionKind::Push { src: Operand::SegReg(SegReg::Ss), width: op_width }),
        0x17 => Ok(InstructionKind::Pop { dst: Operand::SegReg(SegReg::Ss), width: op_width }),
        0x1E => Ok(InstructionKind::Push { src: Operand::SegReg(SegReg::Ds), width: op_width }),
        0x1F => Ok(InstructionKind::Pop { dst: Operand::SegReg(SegReg::Ds), width: op_width }),

        0x40..=0x47 => Ok(InstructionKind::IncDec {
            op: IncDecOp::Inc,
            dst: reg_operand(op_width, op - 0x40),
            width: op_width,
        }),
        0x48..=0x4F => Ok(InstructionKind::IncDec {
            op: IncDecOp::Dec,
            dst: reg_operand(op_width, op - 0x48),
            width: op_width,
        }),
        0x50..=0x57 => Ok(InstructionKind::Push { src: reg_operand(op_width, op - 0x50), width: op_width }),
        0x58..=0x5F => Ok(InstructionKind::Pop { dst: reg_operand(op_width, op - 0x58), width: op_width }),
        0x60 => Ok(InstructionKind::Pusha { width: op_width }),
        0x61 => Ok(InstructionKind::Popa { width: op_width }),

        0x68 => {
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let imm = b.imm(n)?;
            let src = if op_width == Width::W32 { Operand::Imm32(imm as u32) } else { Operand::Imm16(imm as u16) };
            Ok(InstructionKind::Push { src, width: op_width })
        }
        0x6A => {
            let imm = b.imm(1)? as u8 as i8;
            Ok(InstructionKind::Push { src: Operand::ImmS8(imm), width: op_width })
        }
        0x69 => {
            let ctx = b.modrm(addr32, seg)?;
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let imm = b.imm(n)? as i32;
            Ok(InstructionKind::ImulMulti {
                dst: wide_reg(op_width, ctx.reg_field),
                src: reg_or_mem(op_width, ctx),
                imm: Some(imm),
                width: op_width,
            })
        }
        0x6B => {
            let ctx = b.modrm(addr32, seg)?;
            let imm = b.imm(1)? as u8 as i8 as i32;
            Ok(InstructionKind::ImulMulti {
                dst: wide_reg(op_width, ctx.reg_field),
                src: reg_or_mem(op_width, ctx),
                imm: Some(imm),
                width: op_width,
            })
        }
        0x6C | 0x6D => Ok(InstructionKind::StringOp {
            op: StringOpKind::Ins,
            width: if op == 0x6C { Width::W8 } else { op_width },
            rep: prefixes.rep,
            segment: SegReg::Es,
        }),
        0x6E | 0x6F => Ok(InstructionKind::StringOp {
            op: StringOpKind::Outs,
            width: if op == 0x6E { Width::W8 } else { op_width },
            rep: prefixes.rep,
            segment: seg.unwrap_or(SegReg::Ds),
        }),

        0x70..=0x7F => {
            let rel = b.imm(1)? as u8 as i8;
            Ok(InstructionKind::Jcc {
                cond: Condition::from_low_nibble(op).expect("0x70..=0x7F maps to a condition"),
                target_rel: rel as i32,
            })
        }

        0x80 => group1(b, Width::W8, addr32, seg, 1, false),
        0x81 => {
            let n = if op_width == Width::W32 { 4 } else { 2 };
            group1(b, op_width, addr32, seg, n, false)
        }
        0x83 => group1(b, op_width, addr32, seg, 1, true),

        0x84 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Logical {
                op: LogicalOp::Test,
                dst: reg_or_mem(Width::W8, ctx),
                src: reg_operand(Width::W8, ctx.reg_field),
                width: Width::W8,
            })
        }
        0x85 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Logical {
                op: LogicalOp::Test,
                dst: reg_or_mem(op_width, ctx),
                src: reg_operand(op_width, ctx.reg_field),
                width: op_width,
            })
        }
        0x86 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Xchg {
                a: reg_or_mem(Width::W8, ctx),
                b: reg_operand(Width::W8, ctx.reg_field),
                width: Width::W8,
            })
        }
        0x87 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Xchg {
                a: reg_or_mem(op_width, ctx),
                b: reg_operand(op_width, ctx.reg_field),
                width: op_width,
            })
        }

        0x88 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Mov { dst: reg_or_mem(Width::W8, ctx), src: reg_operand(Width::W8, ctx.reg_field), width: Width::W8 })
        }
        0x89 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Mov { dst: reg_or_mem(op_width, ctx), src: reg_operand(op_width, ctx.reg_field), width: op_width })
        }
        0x8A => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Mov { dst: reg_operand(Width::W8, ctx.reg_field), src: reg_or_mem(Width::W8, ctx), width: Width::W8 })
        }
        0x8B => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Mov { dst: reg_operand(op_width, ctx.reg_field), src: reg_or_mem(op_width, ctx), width: op_width })
        }
        0x8C => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Mov {
                dst: reg_or_mem(Width::W16, ctx),
                src: Operand::SegReg(SegReg::from_index(ctx.reg_field)),
                width: Width::W16,
            })
        }
        0x8E => {
            let ctx = b.modrm(addr32, seg)?;
            // `MOV CS, r/m` is architecturally forbidden; the CPU crate's
            // executor rejects it at execute time, so the
            // parser still accepts the encoding structurally.
            Ok(InstructionKind::Mov {
                dst: Operand::SegReg(SegReg::from_index(ctx.reg_field)),
                src: reg_or_mem(Width::W16, ctx),
                width: Width::W16,
            })
        }
        0x8D => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Lea { dst: wide_reg(op_width, ctx.reg_field), mem: ctx })
        }
        0x8F => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Pop { dst: reg_or_mem(op_width, ctx), width: op_width })
        }

        0x90 => Ok(InstructionKind::Nop),
        0x91..=0x97 => Ok(InstructionKind::Xchg {
            a: reg_operand(op_width, 0),
            b: reg_operand(op_width, op - 0x90),
            width: op_width,
        }),

        0x9A => {
            let off = b.imm(2)? as u16;
            let seg_val = b.imm(2)? as u16;
            Ok(InstructionKind::CallFar { target: FarTarget::Direct { segment: seg_val, offset: off as u32 } })
        }
        0x9B => Ok(InstructionKind::FpuStub { op: FpuStubOp::Fwait, mem: None }),
        0x9C => Ok(InstructionKind::Pushf { width: op_width }),
        0x9D => Ok(InstructionKind::Popf { width: op_width }),
        0x9E => Ok(InstructionKind::Sahf),
        0x9F => Ok(InstructionKind::Lahf),

        0xA0 => {
            let addr = b.imm(if addr32 { 4 } else { 2 })? as u32;
            Ok(InstructionKind::Mov { dst: Operand::Reg8(Reg8::Al), src: moffs_operand(addr, Width::W8, addr32, seg), width: Width::W8 })
        }
        0xA1 => {
            let addr = b.imm(if addr32 { 4 } else { 2 })? as u32;
            Ok(InstructionKind::Mov { dst: reg_operand(op_width, 0), src: moffs_operand(addr, op_width, addr32, seg), width: op_width })
        }
        0xA2 => {
            let addr = b.imm(if addr32 { 4 } else { 2 })? as u32;
            Ok(InstructionKind::Mov { dst: moffs_operand(addr, Width::W8, addr32, seg), src: Operand::Reg8(Reg8::Al), width: Width::W8 })
        }
        0xA3 => {
            let addr = b.imm(if addr32 { 4 } else { 2 })? as u32;
            Ok(InstructionKind::Mov { dst: moffs_operand(addr, op_width, addr32, seg), src: reg_operand(op_width, 0), width: op_width })
        }
        0xA4 | 0xA5 => Ok(InstructionKind::StringOp {
            op: StringOpKind::Movs,
            width: if op == 0xA4 { Width::W8 } else { op_width },
            rep: prefixes.rep,
            segment: seg.unwrap_or(SegReg::Ds),
        }),
        0xA6 | 0xA7 => Ok(InstructionKind::StringOp {
            op: StringOpKind::Cmps,
            width: if op == 0xA6 { Width::W8 } else { op_width },
            rep: cfgcpu_decoder::resolve_rep_for_compare(prefixes.rep),
            segment: seg.unwrap_or(SegReg::Ds),
        }),
        0xA8 => {
            let imm = b.imm(1)? as u8;
            Ok(InstructionKind::Logical { op: LogicalOp::Test, dst: Operand::Reg8(Reg8::Al), src: Operand::Imm8(imm), width: Width::W8 })
        }
        0xA9 => {
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let imm = b.imm(n)?;
            let src = if op_width == Width::W32 { Operand::Imm32(imm as u32) } else { Operand::Imm16(imm as u16) };
            Ok(InstructionKind::Logical { op: LogicalOp::Test, dst: reg_operand(op_width, 0), src, width: op_width })
        }
        0xAA | 0xAB => Ok(InstructionKind::StringOp {
            op: StringOpKind::Stos,
            width: if op == 0xAA { Width::W8 } else { op_width },
            rep: prefixes.rep,
            segment: SegReg::Es,
        }),
        0xAC | 0xAD => Ok(InstructionKind::StringOp {
            op: StringOpKind::Lods,
            width: if op == 0xAC { Width::W8 } else { op_width },
            rep: prefixes.rep,
            segment: seg.unwrap_or(SegReg::Ds),
        }),
        0xAE | 0xAF => Ok(InstructionKind::StringOp {
            op: StringOpKind::Scas,
            width: if op == 0xAE { Width::W8 } else { op_width },
            rep: cfgcpu_decoder::resolve_rep_for_compare(prefixes.rep),
            segment: SegReg::Es,
        }),

        0xB0..=0xB7 => {
            let imm = b.imm(1)? as u8;
            Ok(InstructionKind::Mov { dst: Operand::Reg8(Reg8::from_index(op - 0xB0)), src: Operand::Imm8(imm), width: Width::W8 })
        }
        0xB8..=0xBF => {
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let imm = b.imm(n)?;
            let (dst, src) = if op_width == Width::W32 {
                (reg_operand(Width::W32, op - 0xB8), Operand::Imm32(imm as u32))
            } else {
                (reg_operand(Width::W16, op - 0xB8), Operand::Imm16(imm as u16))
            };
            Ok(InstructionKind::Mov { dst, src, width: op_width })
        }

        0xC0 => group2(b, Width::W8, addr32, seg, ShiftCount::Imm(0), true),
        0xC1 => group2(b, op_width, addr32, seg, ShiftCount::Imm(0), true),
        0xC2 => {
            let n = b.imm(2)? as u16;
            Ok(InstructionKind::RetNear { pop_bytes: n })
        }
        0xC3 => Ok(InstructionKind::RetNear { pop_bytes: 0 }),
        0xC4 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::LoadFarPtr { op: LoadFarPtrOp::Les, dst: wide_reg(op_width, ctx.reg_field), mem: ctx })
        }
        0xC5 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::LoadFarPtr { op: LoadFarPtrOp::Lds, dst: wide_reg(op_width, ctx.reg_field), mem: ctx })
        }
        0xC6 => {
            let ctx = b.modrm(addr32, seg)?;
            let imm = b.imm(1)? as u8;
            Ok(InstructionKind::Mov { dst: reg_or_mem(Width::W8, ctx), src: Operand::Imm8(imm), width: Width::W8 })
        }
        0xC7 => {
            let ctx = b.modrm(addr32, seg)?;
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let imm = b.imm(n)?;
            let src = if op_width == Width::W32 { Operand::Imm32(imm as u32) } else { Operand::Imm16(imm as u16) };
            Ok(InstructionKind::Mov { dst: reg_or_mem(op_width, ctx), src, width: op_width })
        }
        0xC8 => {
            let size = b.imm(2)? as u16;
            let level = b.imm(1)? as u8;
            Ok(InstructionKind::Enter { alloc_size: size, nesting_level: level })
        }
        0xC9 => Ok(InstructionKind::Leave),
        0xCA => {
            let n = b.imm(2)? as u16;
            Ok(InstructionKind::RetFar { pop_bytes: n })
        }
        0xCB => Ok(InstructionKind::RetFar { pop_bytes: 0 }),
        0xCC => Ok(InstructionKind::Int { vector: 3 }),
        0xCD => {
            let v = b.imm(1)? as u8;
            Ok(InstructionKind::Int { vector: v })
        }
        0xCE => Ok(InstructionKind::IntO),
        0xCF => Ok(InstructionKind::Iret { width: op_width }),

        0xD0 => group2(b, Width::W8, addr32, seg, ShiftCount::One, false),
        0xD1 => group2(b, op_width, addr32, seg, ShiftCount::One, false),
        0xD2 => group2(b, Width::W8, addr32, seg, ShiftCount::Cl, false),
        0xD3 => group2(b, op_width, addr32, seg, ShiftCount::Cl, false),
        0xD4 => {
            let base = b.imm(1)? as u8;
            Ok(InstructionKind::Bcd(BcdOp::Aam { base }))
        }
        0xD5 => {
            let base = b.imm(1)? as u8;
            Ok(InstructionKind::Bcd(BcdOp::Aad { base }))
        }
        0xD6 => Ok(InstructionKind::Salc),
        0xD7 => Ok(InstructionKind::Xlat),
        0xD8..=0xDF => fpu_stub(b, op, addr32, seg),

        0xE0 => {
            let rel = b.imm(1)? as u8 as i8;
            Ok(InstructionKind::Loop { kind: LoopKind::Loopne, use_ecx: addr32, target_rel: rel })
        }
        0xE1 => {
            let rel = b.imm(1)? as u8 as i8;
            Ok(InstructionKind::Loop { kind: LoopKind::Loope, use_ecx: addr32, target_rel: rel })
        }
        0xE2 => {
            let rel = b.imm(1)? as u8 as i8;
            Ok(InstructionKind::Loop { kind: LoopKind::Loop, use_ecx: addr32, target_rel: rel })
        }
        0xE3 => {
            let rel = b.imm(1)? as u8 as i8;
            Ok(InstructionKind::Jcxz { use_ecx: addr32, target_rel: rel })
        }
        0xE4 => {
            let port = b.imm(1)? as u8;
            Ok(InstructionKind::IoPort { op: InOutOp::In, port: PortOperand::Imm(port), width: Width::W8 })
        }
        0xE5 => {
            let port = b.imm(1)? as u8;
            Ok(InstructionKind::IoPort { op: InOutOp::In, port: PortOperand::Imm(port), width: op_width })
        }
        0xE6 => {
            let port = b.imm(1)? as u8;
            Ok(InstructionKind::IoPort { op: InOutOp::Out, port: PortOperand::Imm(port), width: Width::W8 })
        }
        0xE7 => {
            let port = b.imm(1)? as u8;
            Ok(InstructionKind::IoPort { op: InOutOp::Out, port: PortOperand::Imm(port), width: op_width })
        }
        0xE8 => {
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let rel = b.imm(n)? as i32;
            let rel = if n == 2 { rel as i16 as i32 } else { rel };
            Ok(InstructionKind::CallNear { target: NearTarget::Relative(rel) })
        }
        0xE9 => {
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let rel = b.imm(n)? as i32;
            let rel = if n == 2 { rel as i16 as i32 } else { rel };
            Ok(InstructionKind::JmpNear { target: NearTarget::Relative(rel) })
        }
        0xEA => {
            let off = b.imm(if op_width == Width::W32 { 4 } else { 2 })? as u32;
            let seg_val = b.imm(2)? as u16;
            Ok(InstructionKind::JmpFar { target: FarTarget::Direct { segment: seg_val, offset: off } })
        }
        0xEB => {
            let rel = b.imm(1)? as u8 as i8;
            Ok(InstructionKind::JmpNear { target: NearTarget::Relative(rel as i32) })
        }
        0xEC => Ok(InstructionKind::IoPort { op: InOutOp::In, port: PortOperand::Dx, width: Width::W8 }),
        0xED => Ok(InstructionKind::IoPort { op: InOutOp::In, port: PortOperand::Dx, width: op_width }),
        0xEE => Ok(InstructionKind::IoPort { op: InOutOp::Out, port: PortOperand::Dx, width: Width::W8 }),
        0xEF => Ok(InstructionKind::IoPort { op: InOutOp::Out, port: PortOperand::Dx, width: op_width }),

        0xF1 => Ok(InstructionKind::InvalidOpcode { opcode_bytes: vec![op] }),
        0xF4 => Ok(InstructionKind::Hlt),
        0xF5 => Ok(InstructionKind::FlagControl(FlagCtlOp::Cmc)),
        0xF6 => group3(b, Width::W8, addr32, seg),
        0xF7 => group3(b, op_width, addr32, seg),
        0xF8 => Ok(InstructionKind::FlagControl(FlagCtlOp::Clc)),
        0xF9 => Ok(InstructionKind::FlagControl(FlagCtlOp::Stc)),
        0xFA => Ok(InstructionKind::FlagControl(FlagCtlOp::Cli)),
        0xFB => Ok(InstructionKind::FlagControl(FlagCtlOp::Sti)),
        0xFC => Ok(InstructionKind::FlagControl(FlagCtlOp::Cld)),
        0xFD => Ok(InstructionKind::FlagControl(FlagCtlOp::Std)),
        0xFE => group4(b, addr32, seg),
        0xFF => group5(b, op_width, addr32, seg),

        _ => Ok(InstructionKind::InvalidOpcode { opcode_bytes: vec![op] }),
    }
}

fn group1(
    b: &mut Builder<'_>,
    width: Width,
    addr32: bool,
    seg: Option<SegReg>,
    imm_bytes: u8,
    sign_extend_imm8: bool,
) -> Result<InstructionKind, DecodeError> {
    let ctx = b.modrm(addr32, seg)?;
    let dst = reg_or_mem(width, ctx);
    let raw = b.imm(imm_bytes)?;
    let src = if sign_extend_imm8 {
        let v = raw as u8 as i8 as i32;
        match width {
            Width::W32 => Operand::Imm32(v as u32),
            Width::W16 => Operand::Imm16(v as u16),
            Width::W8 => Operand::Imm8(v as u8),
        }
    } else {
        match width {
            Width::W32 => Operand::Imm32(raw as u32),
            Width::W16 => Operand::Imm16(raw as u16),
            Width::W8 => Operand::Imm8(raw as u8),
        }
    };
    let op = match ctx.reg_field {
        0 => return Ok(InstructionKind::Arithmetic { op: ArithOp::Add, dst, src, width }),
        1 => return Ok(InstructionKind::Logical { op: LogicalOp::Or, dst, src, width }),
        2 => return Ok(InstructionKind::Arithmetic { op: ArithOp::Adc, dst, src, width }),
        3 => return Ok(InstructionKind::Arithmetic { op: ArithOp::Sbb, dst, src, width }),
        4 => return Ok(InstructionKind::Logical { op: LogicalOp::And, dst, src, width }),
        5 => return Ok(InstructionKind::Arithmetic { op: ArithOp::Sub, dst, src, width }),
        6 => return Ok(InstructionKind::Logical { op: LogicalOp::Xor, dst, src, width }),
        _ => ArithOp::Cmp,
    };
    Ok(InstructionKind::Arithmetic { op, dst, src, width })
}

fn group2(
    b: &mut Builder<'_>,
    width: Width,
    addr32: bool,
    seg: Option<SegReg>,
    count_shape: ShiftCount,
    has_imm8: bool,
) -> Result<InstructionKind, DecodeError> {
    let ctx = b.modrm(addr32, seg)?;
    let dst = reg_or_mem(width, ctx);
    let count = if has_imm8 {
        ShiftCount::Imm(b.imm(1)? as u8)
    } else {
        count_shape
    };
    let op = match ctx.reg_field {
        0 => ShiftOp::Rol,
        1 => ShiftOp::Ror,
        2 => ShiftOp::Rcl,
        3 => ShiftOp::Rcr,
        4 | 6 => ShiftOp::Shl,
        5 => ShiftOp::Shr,
        _ => ShiftOp::Sar,
    };
    Ok(InstructionKind::Shift { op, dst, count, width })
}

fn group3(b: &mut Builder<'_>, width: Width, addr32: bool, seg: Option<SegReg>) -> Result<InstructionKind, DecodeError> {
    let ctx = b.modrm(addr32, seg)?;
    let operand = reg_or_mem(width, ctx);
    Ok(match ctx.reg_field {
        0 | 1 => {
            let n = if width == Width::W32 { 4 } else if width == Width::W16 { 2 } else { 1 };
            let raw = b.imm(n)?;
            let src = match width {
                Width::W32 => Operand::Imm32(raw as u32),
                Width::W16 => Operand::Imm16(raw as u16),
                Width::W8 => Operand::Imm8(raw as u8),
            };
            InstructionKind::Logical { op: LogicalOp::Test, dst: operand, src, width }
        }
        2 => InstructionKind::Not { dst: operand, width },
        3 => InstructionKind::IncDec { op: IncDecOp::Neg, dst: operand, width },
        4 => InstructionKind::MulDiv { op: MulDivOp::Mul, src: operand, width },
        5 => InstructionKind::MulDiv { op: MulDivOp::Imul, src: operand, width },
        6 => InstructionKind::MulDiv { op: MulDivOp::Div, src: operand, width },
        _ => InstructionKind::MulDiv { op: MulDivOp::Idiv, src: operand, width },
    })
}

fn group4(b: &mut Builder<'_>, addr32: bool, seg: Option<SegReg>) -> Result<InstructionKind, DecodeError> {
    let ctx = b.modrm(addr32, seg)?;
    let dst = reg_or_mem(Width::W8, ctx);
    let op = if ctx.reg_field == 0 { IncDecOp::Inc } else { IncDecOp::Dec };
    Ok(InstructionKind::IncDec { op, dst, width: Width::W8 })
}

fn group5(b: &mut Builder<'_>, width: Width, addr32: bool, seg: Option<SegReg>) -> Result<InstructionKind, DecodeError> {
    let ctx = b.modrm(addr32, seg)?;
    Ok(match ctx.reg_field {
        0 => InstructionKind::IncDec { op: IncDecOp::Inc, dst: reg_or_mem(width, ctx), width },
        1 => InstructionKind::IncDec { op: IncDecOp::Dec, dst: reg_or_mem(width, ctx), width },
        2 => InstructionKind::CallNear { target: NearTarget::Indirect(reg_or_mem(width, ctx)) },
        3 => InstructionKind::CallFar { target: FarTarget::Indirect(ctx) },
        4 => InstructionKind::JmpNear { target: NearTarget::Indirect(reg_or_mem(width, ctx)) },
        5 => InstructionKind::JmpFar { target: FarTarget::Indirect(ctx) },
        _ => InstructionKind::Push { src: reg_or_mem(width, ctx), width },
    })
}

fn fpu_stub(b: &mut Builder<'_>, op: u8, addr32: bool, seg: Option<SegReg>) -> Result<InstructionKind, DecodeError> {
    // x87 opcodes always carry a ModRM-shaped byte, even in the register-direct
    // (mod=11) "opcode extension" forms used by FNINIT/FNSTSW's AX form.
    let ctx = b.modrm(addr32, seg)?;
    if op == 0xDB && ctx.raw == 0xE3 {
        return Ok(InstructionKind::FpuStub { op: FpuStubOp::Fninit, mem: None });
    }
    if op == 0xD9 && ctx.is_memory && ctx.reg_field == 7 {
        return Ok(InstructionKind::FpuStub { op: FpuStubOp::Fnstcw, mem: Some(Operand::Mem(ctx)) });
    }
    if op == 0xDD && ctx.is_memory && ctx.reg_field == 7 {
        return Ok(InstructionKind::FpuStub { op: FpuStubOp::Fnstsw, mem: Some(Operand::Mem(ctx)) });
    }
    if op == 0xDF && ctx.raw == 0xE0 {
        return Ok(InstructionKind::FpuStub { op: FpuStubOp::Fnstsw, mem: Some(Operand::Reg16(Reg16::Ax)) });
    }
    // Any other x87 opcode: this 386-class core has no FPU, so every
    // remaining encoding is a no-op stub too.
    Ok(InstructionKind::FpuStub { op: FpuStubOp::Fwait, mem: None })
}

fn parse_two_byte(
    b: &mut Builder<'_>,
    prefixes: &PrefixSet,
    op_width: Width,
    addr32: bool,
    seg: Option<SegReg>,
) -> Result<InstructionKind, DecodeError> {
    let op2 = b.opcode_byte()?;
    match op2 {
        0x80..=0x8F => {
            let n = if op_width == Width::W32 { 4 } else { 2 };
            let rel = b.imm(n)? as i32;
            let rel = if n == 2 { rel as i16 as i32 } else { rel };
            Ok(InstructionKind::Jcc {
                cond: Condition::from_low_nibble(op2).expect("0x0F 0x80..=0x8F maps to a condition"),
                target_rel: rel,
            })
        }
        0xA2 => Ok(InstructionKind::Cpuid),
        0xB2 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::LoadFarPtr { op: LoadFarPtrOp::Lss, dst: wide_reg(op_width, ctx.reg_field), mem: ctx })
        }
        0xB4 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::LoadFarPtr { op: LoadFarPtrOp::Lfs, dst: wide_reg(op_width, ctx.reg_field), mem: ctx })
        }
        0xB5 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::LoadFarPtr { op: LoadFarPtrOp::Lgs, dst: wide_reg(op_width, ctx.reg_field), mem: ctx })
        }
        0xB6 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::MovZx { dst: wide_reg(op_width, ctx.reg_field), src: reg_or_mem(Width::W8, ctx), src_width: Width::W8 })
        }
        0xB7 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::MovZx { dst: wide_reg(op_width, ctx.reg_field), src: reg_or_mem(Width::W16, ctx), src_width: Width::W16 })
        }
        0xBE => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::MovSx { dst: wide_reg(op_width, ctx.reg_field), src: reg_or_mem(Width::W8, ctx), src_width: Width::W8 })
        }
        0xBF => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::MovSx { dst: wide_reg(op_width, ctx.reg_field), src: reg_or_mem(Width::W16, ctx), src_width: Width::W16 })
        }
        0xA3 | 0xAB | 0xB3 | 0xBB => {
            // BT/BTS/BTR/BTC r/m, r — out of scope for this DOS-era subset;
            // decode structurally as a logical no-result TEST so the opcode
            // table stays total without inventing bit-test execution semantics.
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::Logical {
                op: LogicalOp::Test,
                dst: reg_or_mem(op_width, ctx),
                src: reg_operand(op_width, ctx.reg_field),
                width: op_width,
            })
        }
        0xA0 => Ok(InstructionKind::Push { src: Operand::SegReg(SegReg::Fs), width: op_width }),
        0xA1 => Ok(InstructionKind::Pop { dst: Operand::SegReg(SegReg::Fs), width: op_width }),
        0xA8 => Ok(InstructionKind::Push { src: Operand::SegReg(SegReg::Gs), width: op_width }),
        0xA9 => Ok(InstructionKind::Pop { dst: Operand::SegReg(SegReg::Gs), width: op_width }),
        0xC8..=0xCF => Ok(InstructionKind::Bswap { reg: Reg32::from_index(op2 - 0xC8) }),
        0xA4 => {
            let ctx = b.modrm(addr32, seg)?;
            let imm = b.imm(1)? as u8;
            Ok(InstructionKind::DoubleShift {
                op: DoubleShiftOp::Shld,
                dst: reg_or_mem(op_width, ctx),
                src: reg_operand(op_width, ctx.reg_field),
                count: ShiftCount::Imm(imm),
                width: op_width,
            })
        }
        0xA5 => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::DoubleShift {
                op: DoubleShiftOp::Shld,
                dst: reg_or_mem(op_width, ctx),
                src: reg_operand(op_width, ctx.reg_field),
                count: ShiftCount::Cl,
                width: op_width,
            })
        }
        0xAC => {
            let ctx = b.modrm(addr32, seg)?;
            let imm = b.imm(1)? as u8;
            Ok(InstructionKind::DoubleShift {
                op: DoubleShiftOp::Shrd,
                dst: reg_or_mem(op_width, ctx),
                src: reg_operand(op_width, ctx.reg_field),
                count: ShiftCount::Imm(imm),
                width: op_width,
            })
        }
        0xAD => {
            let ctx = b.modrm(addr32, seg)?;
            Ok(InstructionKind::DoubleShift {
                op: DoubleShiftOp::Shrd,
                dst: reg_or_mem(op_width, ctx),
                src: reg_operand(op_width, ctx.reg_field),
                count: ShiftCount::Cl,
                width: op_width,
            })
        }
        _ => Ok(InstructionKind::InvalidOpcode { opcode_bytes: vec![0x0F, op2] }),
    }
}

/// Public entry point used by `cfgcpu-cpu`'s feeder: real-mode code always
/// uses 16-bit operand/address defaults unless a `66`/`67` prefix overrides
/// them, so both defaults collapse to the same flag here.
pub fn parse_instruction(bytes: &[u8], address: SegmentedAddress, default_operand_size_32: bool) -> CfgInstruction {
    parse(bytes, address, default_operand_size_32, default_operand_size_32)
}
