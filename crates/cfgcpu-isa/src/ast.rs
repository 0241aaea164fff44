//! A lightweight structural AST view of a `CfgInstruction`, distinct from the
//! assembly-string printer: callers that want to pattern-match on mnemonic +
//! operands programmatically (the breakpoint expression compiler, offline
//! tooling) use this instead of re-parsing `to_assembly_string()`'s text.

use crate::instruction::CfgInstruction;
use crate::kind::InstructionKind;
use crate::operand::Operand;
use cfgcpu_types::SegmentedAddress;

/// An operand rendered for AST consumption: simplified relative to
/// `Operand` in that register/memory/immediate are each a single shape a
/// caller can match on without caring about the exact bit width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandAst {
    Register(&'static str),
    Memory { segment: &'static str, text: String },
    Immediate(i64),
    Relative(i64),
}

/// Structural view of one `CfgInstruction`: its address, a stable mnemonic
/// tag, and its operands in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionAst {
    pub address: SegmentedAddress,
    pub mnemonic: &'static str,
    pub operands: Vec<OperandAst>,
}

pub trait ToInstructionAst {
    fn to_instruction_ast(&self) -> InstructionAst;
}

fn operand_ast(op: &Operand) -> OperandAst {
    match op {
        Operand::Reg8(_) | Operand::Reg16(_) | Operand::Reg32(_) | Operand::SegReg(_) => {
            OperandAst::Register(register_name(op))
        }
        Operand::Mem(ctx) => OperandAst::Memory {
            segment: segment_name(ctx.effective_segment()),
            text: crate::asm::mem_str(ctx),
        },
        Operand::Imm8(v) => OperandAst::Immediate(*v as i64),
        Operand::Imm16(v) => OperandAst::Immediate(*v as i64),
        Operand::Imm32(v) => OperandAst::Immediate(*v as i64),
        Operand::ImmS8(v) => OperandAst::Immediate(*v as i64),
        Operand::Rel8(v) => OperandAst::Relative(*v as i64),
        Operand::Rel16(v) => OperandAst::Relative(*v as i64),
        Operand::Rel32(v) => OperandAst::Relative(*v as i64),
        Operand::FarPtr16 { segment, offset } => OperandAst::Immediate(((*segment as i64) << 16) | *offset as i64),
    }
}

fn register_name(op: &Operand) -> &'static str {
    match op {
        Operand::Reg8(r) => match r {
            cfgcpu_types::Reg8::Al => "al",
            cfgcpu_types::Reg8::Cl => "cl",
            cfgcpu_types::Reg8::Dl => "dl",
            cfgcpu_types::Reg8::Bl => "bl",
            cfgcpu_types::Reg8::Ah => "ah",
            cfgcpu_types::Reg8::Ch => "ch",
            cfgcpu_types::Reg8::Dh => "dh",
            cfgcpu_types::Reg8::Bh => "bh",
        },
        Operand::Reg16(r) => match r {
            cfgcpu_types::Reg16::Ax => "ax",
            cfgcpu_types::Reg16::Cx => "cx",
            cfgcpu_types::Reg16::Dx => "dx",
            cfgcpu_types::Reg16::Bx => "bx",
            cfgcpu_types::Reg16::Sp => "sp",
            cfgcpu_types::Reg16::Bp => "bp",
            cfgcpu_types::Reg16::Si => "si",
            cfgcpu_types::Reg16::Di => "di",
        },
        Operand::Reg32(r) => match r {
            cfgcpu_types::Reg32::Eax => "eax",
            cfgcpu_types::Reg32::Ecx => "ecx",
            cfgcpu_types::Reg32::Edx => "edx",
            cfgcpu_types::Reg32::Ebx => "ebx",
            cfgcpu_types::Reg32::Esp => "esp",
            cfgcpu_types::Reg32::Ebp => "ebp",
            cfgcpu_types::Reg32::Esi => "esi",
            cfgcpu_types::Reg32::Edi => "edi",
        },
        Operand::SegReg(r) => segment_name(*r),
        _ => unreachable!("register_name called on a non-register operand"),
    }
}

fn segment_name(s: cfgcpu_types::SegReg) -> &'static str {
    match s {
        cfgcpu_types::SegReg::Es => "es",
        cfgcpu_types::SegReg::Cs => "cs",
        cfgcpu_types::SegReg::Ss => "ss",
        cfgcpu_types::SegReg::Ds => "ds",
        cfgcpu_types::SegReg::Fs => "fs",
        cfgcpu_types::SegReg::Gs => "gs",
    }
}

fn mnemonic_of(kind: &InstructionKind) -> &'static str {
    use crate::kind::*;
    use InstructionKind::*;
    match kind {
        Arithmetic { op, .. } => match op {
            ArithOp::Add => "add",
            ArithOp::Adc => "adc",
            ArithOp::Sub => "sub",
            ArithOp::Sbb => "sbb",
            ArithOp::Cmp => "cmp",
        },
        IncDec { op, .. } => match op {
            IncDecOp::Inc => "inc",
            IncDecOp::Dec => "dec",
            IncDecOp::Neg => "neg",
        },
        Logical { op, .. } => match op {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Xor => "xor",
            LogicalOp::Test => "test",
        },
        Not { .. } => "not",
        Shift { op, .. } => match op {
            ShiftOp::Shl => "shl",
            ShiftOp::Shr => "shr",
            ShiftOp::Sar => "sar",
            ShiftOp::Rol => "rol",
            ShiftOp::Ror => "ror",
            ShiftOp::Rcl => "rcl",
            ShiftOp::Rcr => "rcr",
        },
        DoubleShift { op, .. } => match op {
            DoubleShiftOp::Shld => "shld",
            DoubleShiftOp::Shrd => "shrd",
        },
        MulDiv { op, .. } => match op {
            MulDivOp::Mul => "mul",
            MulDivOp::Imul => "imul",
            MulDivOp::Div => "div",
            MulDivOp::Idiv => "idiv",
        },
        ImulMulti { .. } => "imul",
        Bcd(op) => match op {
            BcdOp::Aaa => "aaa",
            BcdOp::Aas => "aas",
            BcdOp::Daa => "daa",
            BcdOp::Das => "das",
            BcdOp::Aam { .. } => "aam",
            BcdOp::Aad { .. } => "aad",
        },
        Mov { .. } => "mov",
        MovSx { .. } => "movsx",
        MovZx { .. } => "movzx",
        Lea { .. } => "lea",
        Lahf => "lahf",
        Sahf => "sahf",
        Xchg { .. } => "xchg",
        Xlat => "xlat",
        Bswap { .. } => "bswap",
        LoadFarPtr { op, .. } => match op {
            LoadFarPtrOp::Les => "les",
            LoadFarPtrOp::Lds => "lds",
            LoadFarPtrOp::Lss => "lss",
            LoadFarPtrOp::Lfs => "lfs",
            LoadFarPtrOp::Lgs => "lgs",
        },
        Push { .. } => "push",
        Pop { .. } => "pop",
        Pushf { .. } => "pushf",
        Popf { .. } => "popf",
        Pusha { .. } => "pusha",
        Popa { .. } => "popa",
        Enter { .. } => "enter",
        Leave => "leave",
        CallNear { .. } => "call",
        CallFar { .. } => "callf",
        RetNear { .. } => "ret",
        RetFar { .. } => "retf",
        Jcc { cond, .. } => jcc_mnemonic(*cond),
        Jcxz { use_ecx, .. } => {
            if *use_ecx {
                "jecxz"
            } else {
                "jcxz"
            }
        }
        JmpNear { .. } => "jmp",
        JmpFar { .. } => "jmpf",
        Loop { kind, .. } => match kind {
            LoopKind::Loop => "loop",
            LoopKind::Loope => "loope",
            LoopKind::Loopne => "loopne",
        },
        StringOp { op, .. } => match op {
            StringOpKind::Movs => "movs",
            StringOpKind::Cmps => "cmps",
            StringOpKind::Scas => "scas",
            StringOpKind::Lods => "lods",
            StringOpKind::Stos => "stos",
            StringOpKind::Ins => "ins",
            StringOpKind::Outs => "outs",
        },
        FlagControl(op) => match op {
            FlagCtlOp::Clc => "clc",
            FlagCtlOp::Stc => "stc",
            FlagCtlOp::Cmc => "cmc",
            FlagCtlOp::Cld => "cld",
            FlagCtlOp::Std => "std",
            FlagCtlOp::Cli => "cli",
            FlagCtlOp::Sti => "sti",
        },
        Int { .. } => "int",
        IntO => "into",
        Iret { .. } => "iret",
        Salc => "salc",
        Hlt => "hlt",
        FpuStub { op, .. } => match op {
            FpuStubOp::Fninit => "fninit",
            FpuStubOp::Fnstcw => "fnstcw",
            FpuStubOp::Fnstsw => "fnstsw",
            FpuStubOp::Fwait => "wait",
        },
        Cpuid => "cpuid",
        IoPort { op, .. } => match op {
            InOutOp::In => "in",
            InOutOp::Out => "out",
        },
        Nop => "nop",
        InvalidOpcode { .. } => "(bad)",
    }
}

fn jcc_mnemonic(cond: crate::operand::Condition) -> &'static str {
    use crate::operand::Condition::*;
    match cond {
        Overflow => "jo",
        NotOverflow => "jno",
        Below => "jb",
        AboveOrEqual => "jae",
        Equal => "je",
        NotEqual => "jne",
        BelowOrEqual => "jbe",
        Above => "ja",
        Sign => "js",
        NotSign => "jns",
        ParityEven => "jp",
        ParityOdd => "jnp",
        Less => "jl",
        GreaterOrEqual => "jge",
        LessOrEqual => "jle",
        Greater => "jg",
    }
}

fn operands_of(kind: &InstructionKind) -> Vec<OperandAst> {
    use InstructionKind::*;
    match kind {
        Arithmetic { dst, src, .. } | Logical { dst, src, .. } => vec![operand_ast(dst), operand_ast(src)],
        IncDec { dst, .. } | Not { dst, .. } => vec![operand_ast(dst)],
        Shift { dst, .. } | DoubleShift { dst, .. } => vec![operand_ast(dst)],
        MulDiv { src, .. } => vec![operand_ast(src)],
        Mov { dst, src, .. } | Xchg { a: dst, b: src, .. } => vec![operand_ast(dst), operand_ast(src)],
        MovSx { src, .. } | MovZx { src, .. } => vec![operand_ast(src)],
        Push { src, .. } => vec![operand_ast(src)],
        Pop { dst, .. } => vec![operand_ast(dst)],
        Int { vector } => vec![OperandAst::Immediate(*vector as i64)],
        Jcc { target_rel, .. } => vec![OperandAst::Relative(*target_rel as i64)],
        Jcxz { target_rel, .. } | Loop { target_rel, .. } => vec![OperandAst::Relative(*target_rel as i64)],
        JmpNear { target: crate::kind::NearTarget::Relative(r) }
        | CallNear { target: crate::kind::NearTarget::Relative(r) } => vec![OperandAst::Relative(*r as i64)],
        _ => Vec::new(),
    }
}

impl ToInstructionAst for CfgInstruction {
    fn to_instruction_ast(&self) -> InstructionAst {
        InstructionAst {
            address: self.address,
            mnemonic: mnemonic_of(&self.kind),
            operands: operands_of(&self.kind),
        }
    }
}
