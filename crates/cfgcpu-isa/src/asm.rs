//! Renders a `CfgInstruction` back to a human-readable Intel-syntax mnemonic
//! string, for disassembly listings, log lines, and breakpoint expression
//! error messages.

use crate::instruction::CfgInstruction;
use crate::kind::*;
use crate::operand::{Operand, Width};
use cfgcpu_decoder::{Base16, ModRmContext, RepPrefix};
use cfgcpu_types::{Reg16, Reg32, Reg8, SegReg};

pub trait ToAssemblyString {
    fn to_assembly_string(&self) -> String;
}

impl ToAssemblyString for CfgInstruction {
    fn to_assembly_string(&self) -> String {
        let rep = match self.prefixes.rep {
            Some(RepPrefix::Rep) => "rep ",
            Some(RepPrefix::RepE) => "repe ",
            Some(RepPrefix::RepNe) => "repne ",
            None => "",
        };
        let lock = if self.prefixes.lock { "lock " } else { "" };
        format!("{lock}{rep}{}", self.kind.to_assembly_string())
    }
}

fn reg8(r: Reg8) -> &'static str {
    match r {
        Reg8::Al => "al",
        Reg8::Cl => "cl",
        Reg8::Dl => "dl",
        Reg8::Bl => "bl",
        Reg8::Ah => "ah",
        Reg8::Ch => "ch",
        Reg8::Dh => "dh",
        Reg8::Bh => "bh",
    }
}

fn reg16(r: Reg16) -> &'static str {
    match r {
        Reg16::Ax => "ax",
        Reg16::Cx => "cx",
        Reg16::Dx => "dx",
        Reg16::Bx => "bx",
        Reg16::Sp => "sp",
        Reg16::Bp => "bp",
        Reg16::Si => "si",
        Reg16::Di => "di",
    }
}

fn reg32(r: Reg32) -> &'static str {
    match r {
        Reg32::Eax => "eax",
        Reg32::Ecx => "ecx",
        Reg32::Edx => "edx",
        Reg32::Ebx => "ebx",
        Reg32::Esp => "esp",
        Reg32::Ebp => "ebp",
        Reg32::Esi => "esi",
        Reg32::Edi => "edi",
    }
}

fn segreg(r: SegReg) -> &'static str {
    match r {
        SegReg::Es => "es",
        SegReg::Cs => "cs",
        SegReg::Ss => "ss",
        SegReg::Ds => "ds",
        SegReg::Fs => "fs",
        SegReg::Gs => "gs",
    }
}

fn base16(b: Base16) -> &'static str {
    match b {
        Base16::BxSi => "bx+si",
        Base16::BxDi => "bx+di",
        Base16::BpSi => "bp+si",
        Base16::BpDi => "bp+di",
        Base16::Si => "si",
        Base16::Di => "di",
        Base16::Bp => "bp",
        Base16::Bx => "bx",
    }
}

pub(crate) fn mem_str(ctx: &ModRmContext) -> String {
    let mut inner = String::new();
    if ctx.addr_size_32 {
        if let Some(b) = ctx.base32 {
            inner.push_str(reg32(b));
        }
        if let Some((idx, scale)) = ctx.index32 {
            if !inner.is_empty() {
                inner.push('+');
            }
            inner.push_str(reg32(idx));
            if scale != 1 {
                inner.push_str(&format!("*{scale}"));
            }
        }
    } else if let Some(b) = ctx.base16 {
        inner.push_str(base16(b));
    }
    if ctx.disp != 0 || inner.is_empty() {
        if !inner.is_empty() {
            inner.push_str(if ctx.disp < 0 { "-" } else { "+" });
            inner.push_str(&format!("{:#x}", ctx.disp.unsigned_abs()));
        } else {
            inner.push_str(&format!("{:#x}", ctx.disp));
        }
    }
    let seg = ctx.effective_segment();
    format!("{}:[{}]", segreg(seg), inner)
}

fn operand_str(op: &Operand) -> String {
    match op {
        Operand::Reg8(r) => reg8(*r).to_string(),
        Operand::Reg16(r) => reg16(*r).to_string(),
        Operand::Reg32(r) => reg32(*r).to_string(),
        Operand::SegReg(r) => segreg(*r).to_string(),
        Operand::Mem(ctx) => mem_str(ctx),
        Operand::Imm8(v) => format!("{:#x}", v),
        Operand::Imm16(v) => format!("{:#x}", v),
        Operand::Imm32(v) => format!("{:#x}", v),
        Operand::ImmS8(v) => format!("{:#x}", v),
        Operand::Rel8(v) => format!("{:#x}", v),
        Operand::Rel16(v) => format!("{:#x}", v),
        Operand::Rel32(v) => format!("{:#x}", v),
        Operand::FarPtr16 { segment, offset } => format!("{:#x}:{:#x}", segment, offset),
    }
}

fn wide_reg_str(r: Reg32OrReg16) -> String {
    match r {
        Reg32OrReg16::R16(r) => reg16(r).to_string(),
        Reg32OrReg16::R32(r) => reg32(r).to_string(),
    }
}

fn width_suffix(w: Width) -> &'static str {
    match w {
        Width::W8 => "byte",
        Width::W16 => "word",
        Width::W32 => "dword",
    }
}

/// Memory operands get an explicit `byte`/`word`/`dword ptr` prefix — unlike
/// a register operand, a bare `[...]` doesn't tell a reader which width the
/// instruction operates at.
fn sized_operand_str(op: &Operand, width: Width) -> String {
    match op {
        Operand::Mem(ctx) => format!("{} {}", width_suffix(width), mem_str(ctx)),
        other => operand_str(other),
    }
}

fn count_str(c: ShiftCount) -> String {
    match c {
        ShiftCount::One => "1".to_string(),
        ShiftCount::Cl => "cl".to_string(),
        ShiftCount::Imm(v) => format!("{:#x}", v),
    }
}

impl ToAssemblyString for InstructionKind {
    fn to_assembly_string(&self) -> String {
        use InstructionKind::*;
        match self {
            Arithmetic { op, dst, src, width } => {
                let mn = match op {
                    ArithOp::Add => "add",
                    ArithOp::Adc => "adc",
                    ArithOp::Sub => "sub",
                    ArithOp::Sbb => "sbb",
                    ArithOp::Cmp => "cmp",
                };
                format!("{mn} {}, {}", sized_operand_str(dst, *width), operand_str(src))
            }
            IncDec { op, dst, width } => {
                let mn = match op {
                    IncDecOp::Inc => "inc",
                    IncDecOp::Dec => "dec",
                    IncDecOp::Neg => "neg",
                };
                format!("{mn} {}", sized_operand_str(dst, *width))
            }
            Logical { op, dst, src, width } => {
                let mn = match op {
                    LogicalOp::And => "and",
                    LogicalOp::Or => "or",
                    LogicalOp::Xor => "xor",
                    LogicalOp::Test => "test",
                };
                format!("{mn} {}, {}", sized_operand_str(dst, *width), operand_str(src))
            }
            Not { dst, width } => format!("not {}", sized_operand_str(dst, *width)),
            Shift { op, dst, count, width } => {
                let mn = match op {
                    ShiftOp::Shl => "shl",
                    ShiftOp::Shr => "shr",
                    ShiftOp::Sar => "sar",
                    ShiftOp::Rol => "rol",
                    ShiftOp::Ror => "ror",
                    ShiftOp::Rcl => "rcl",
                    ShiftOp::Rcr => "rcr",
                };
                format!("{mn} {}, {}", sized_operand_str(dst, *width), count_str(*count))
            }
            DoubleShift { op, dst, src, count, width } => {
                let mn = match op {
                    DoubleShiftOp::Shld => "shld",
                    DoubleShiftOp::Shrd => "shrd",
                };
                format!("{mn} {}, {}, {}", sized_operand_str(dst, *width), operand_str(src), count_str(*count))
            }
            MulDiv { op, src, width } => {
                let mn = match op {
                    MulDivOp::Mul => "mul",
                    MulDivOp::Imul => "imul",
                    MulDivOp::Div => "div",
                    MulDivOp::Idiv => "idiv",
                };
                format!("{mn} {}", sized_operand_str(src, *width))
            }
            ImulMulti { dst, src, imm, .. } => match imm {
                Some(i) => format!("imul {}, {}, {:#x}", wide_reg_str(*dst), operand_str(src), i),
                None => format!("imul {}, {}", wide_reg_str(*dst), operand_str(src)),
            },
            Bcd(op) => match op {
                BcdOp::Aaa => "aaa".to_string(),
                BcdOp::Aas => "aas".to_string(),
                BcdOp::Daa => "daa".to_string(),
                BcdOp::Das => "das".to_string(),
                BcdOp::Aam { base } => format!("aam {:#x}", base),
                BcdOp::Aad { base } => format!("aad {:#x}", base),
            },
            Mov { dst, src, width } => format!("mov {}, {}", sized_operand_str(dst, *width), operand_str(src)),
            MovSx { dst, src, .. } => format!("movsx {}, {}", wide_reg_str(*dst), operand_str(src)),
            MovZx { dst, src, .. } => format!("movzx {}, {}", wide_reg_str(*dst), operand_str(src)),
            Lea { dst, mem } => format!("lea {}, {}", wide_reg_str(*dst), mem_str(mem)),
            Lahf => "lahf".to_string(),
            Sahf => "sahf".to_string(),
            Xchg { a, b, .. } => format!("xchg {}, {}", operand_str(a), operand_str(b)),
            Xlat => "xlat".to_string(),
            Bswap { reg } => format!("bswap {}", reg32(*reg)),
            LoadFarPtr { op, dst, mem } => {
                let mn = match op {
                    LoadFarPtrOp::Les => "les",
                    LoadFarPtrOp::Lds => "lds",
                    LoadFarPtrOp::Lss => "lss",
                    LoadFarPtrOp::Lfs => "lfs",
                    LoadFarPtrOp::Lgs => "lgs",
                };
                format!("{mn} {}, {}", wide_reg_str(*dst), mem_str(mem))
            }
            Push { src, .. } => format!("push {}", operand_str(src)),
            Pop { dst, .. } => format!("pop {}", operand_str(dst)),
            Pushf { .. } => "pushf".to_string(),
            Popf { .. } => "popf".to_string(),
            Pusha { .. } => "pusha".to_string(),
            Popa { .. } => "popa".to_string(),
            Enter { alloc_size, nesting_level } => format!("enter {:#x}, {:#x}", alloc_size, nesting_level),
            Leave => "leave".to_string(),
            CallNear { target } => format!("call {}", near_target_str(target)),
            CallFar { target } => format!("call far {}", far_target_str(target)),
            RetNear { pop_bytes } if *pop_bytes == 0 => "ret".to_string(),
            RetNear { pop_bytes } => format!("ret {:#x}", pop_bytes),
            RetFar { pop_bytes } if *pop_bytes == 0 => "retf".to_string(),
            RetFar { pop_bytes } => format!("retf {:#x}", pop_bytes),
            Jcc { cond, target_rel } => format!("j{} {:+#x}", cond.mnemonic_suffix(), target_rel),
            Jcxz { use_ecx, target_rel } => {
                format!("{} {:+#x}", if *use_ecx { "jecxz" } else { "jcxz" }, target_rel)
            }
            JmpNear { target } => format!("jmp {}", near_target_str(target)),
            JmpFar { target } => format!("jmp far {}", far_target_str(target)),
            Loop { kind, target_rel, .. } => {
                let mn = match kind {
                    LoopKind::Loop => "loop",
                    LoopKind::Loope => "loope",
                    LoopKind::Loopne => "loopne",
                };
                format!("{mn} {:+#x}", target_rel)
            }
            StringOp { op, width, segment, .. } => {
                let mn = match op {
                    StringOpKind::Movs => "movs",
                    StringOpKind::Cmps => "cmps",
                    StringOpKind::Scas => "scas",
                    StringOpKind::Lods => "lods",
                    StringOpKind::Stos => "stos",
                    StringOpKind::Ins => "ins",
                    StringOpKind::Outs => "outs",
                };
                format!("{mn}{} ({}:)", if *width == Width::W8 { "b" } else { "w" }, segreg(*segment))
            }
            FlagControl(op) => match op {
                FlagCtlOp::Clc => "clc".to_string(),
                FlagCtlOp::Stc => "stc".to_string(),
                FlagCtlOp::Cmc => "cmc".to_string(),
                FlagCtlOp::Cld => "cld".to_string(),
                FlagCtlOp::Std => "std".to_string(),
                FlagCtlOp::Cli => "cli".to_string(),
                FlagCtlOp::Sti => "sti".to_string(),
            },
            Int { vector } => format!("int {:#x}", vector),
            IntO => "into".to_string(),
            Iret { .. } => "iret".to_string(),
            Salc => "salc".to_string(),
            Hlt => "hlt".to_string(),
            FpuStub { op, .. } => match op {
                FpuStubOp::Fninit => "fninit".to_string(),
                FpuStubOp::Fnstcw => "fnstcw".to_string(),
                FpuStubOp::Fnstsw => "fnstsw".to_string(),
                FpuStubOp::Fwait => "wait".to_string(),
            },
            Cpuid => "cpuid".to_string(),
            IoPort { op, port, width } => {
                let mn = match op {
                    InOutOp::In => "in",
                    InOutOp::Out => "out",
                };
                let p = match port {
                    PortOperand::Imm(v) => format!("{:#x}", v),
                    PortOperand::Dx => "dx".to_string(),
                };
                let acc = if *width == Width::W8 { "al" } else { "ax" };
                match op {
                    InOutOp::In => format!("{mn} {acc}, {p}"),
                    InOutOp::Out => format!("{mn} {p}, {acc}"),
                }
            }
            Nop => "nop".to_string(),
            InvalidOpcode { opcode_bytes } => {
                let hex: Vec<String> = opcode_bytes.iter().map(|b| format!("{:02x}", b)).collect();
                format!("(bad {})", hex.join(" "))
            }
        }
    }
}

fn near_target_str(t: &NearTarget) -> String {
    match t {
        NearTarget::Relative(rel) => format!("{:+#x}", rel),
        NearTarget::Indirect(op) => operand_str(op),
    }
}

fn far_target_str(t: &FarTarget) -> String {
    match t {
        FarTarget::Direct { segment, offset } => format!("{:#x}:{:#x}", segment, offset),
        FarTarget::Indirect(ctx) => mem_str(ctx),
    }
}
