use crate::operand::{Condition, Operand, Width};
use cfgcpu_decoder::{ModRmContext, RepPrefix};
use cfgcpu_types::{Reg16, Reg32, SegReg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Adc,
    Sub,
    Sbb,
    Cmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Rcl,
    Rcr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleShiftOp {
    Shld,
    Shrd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftCount {
    One,
    Cl,
    Imm(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulDivOp {
    Mul,
    Imul,
    Div,
    Idiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcdOp {
    Aaa,
    Aas,
    Daa,
    Das,
    Aam { base: u8 },
    Aad { base: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFarPtrOp {
    Les,
    Lds,
    Lss,
    Lfs,
    Lgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagCtlOp {
    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    Cli,
    Sti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOpKind {
    Movs,
    Cmps,
    Scas,
    Lods,
    Stos,
    Ins,
    Outs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Loop,
    Loope,
    Loopne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuStubOp {
    Fninit,
    Fnstcw,
    Fnstsw,
    Fwait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InOutOp {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOperand {
    Imm(u8),
    Dx,
}

/// A near control-transfer target: either a displacement relative to the
/// next instruction, or a register/memory operand holding the absolute
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NearTarget {
    Relative(i32),
    Indirect(Operand),
}

/// A far control-transfer target: a literal `segment:offset` encoded in the
/// instruction, or a memory operand holding a 4/6-byte far pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FarTarget {
    Direct { segment: u16, offset: u32 },
    Indirect(ModRmContext),
}

/// One instruction family per opcode shape. Each variant carries exactly
/// the operand payload its `Execute`/`ToAssemblyString` implementations (in
/// `cfgcpu-cpu` and this crate, respectively) need — a tagged-variant
/// alternative to a per-opcode class hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    Arithmetic {
        op: ArithOp,
        dst: Operand,
        src: Operand,
        width: Width,
    },
    IncDec {
        op: IncDecOp,
        dst: Operand,
        width: Width,
    },
    Logical {
        op: LogicalOp,
        dst: Operand,
        src: Operand,
        width: Width,
    },
    Not {
        dst: Operand,
        width: Width,
    },
    Shift {
        op: ShiftOp,
        dst: Operand,
        count: ShiftCount,
        width: Width,
    },
    DoubleShift {
        op: DoubleShiftOp,
        dst: Operand,
        src: Operand,
        count: ShiftCount,
        width: Width,
    },
    MulDiv {
        op: MulDivOp,
        src: Operand,
        width: Width,
    },
    /// 2- and 3-operand `IMUL` forms (`IMUL r, r/m` and `IMUL r, r/m, imm`).
    ImulMulti {
        dst: Reg32OrReg16,
        src: Operand,
        imm: Option<i32>,
        width: Width,
    },
    Bcd(BcdOp),
    Mov {
        dst: Operand,
        src: Operand,
        width: Width,
    },
    MovSx {
        dst: Reg32OrReg16,
        src: Operand,
        src_width: Width,
    },
    MovZx {
        dst: Reg32OrReg16,
        src: Operand,
        src_width: Width,
    },
    Lea {
        dst: Reg32OrReg16,
        mem: ModRmContext,
    },
    Lahf,
    Sahf,
    Xchg {
        a: Operand,
        b: Operand,
        width: Width,
    },
    Xlat,
    Bswap {
        reg: Reg32,
    },
    LoadFarPtr {
        op: LoadFarPtrOp,
        dst: Reg32OrReg16,
        mem: ModRmContext,
    },
    Push {
        src: Operand,
        width: Width,
    },
    Pop {
        dst: Operand,
        width: Width,
    },
    Pushf {
        width: Width,
    },
    Popf {
        width: Width,
    },
    Pusha {
        width: Width,
    },
    Popa {
        width: Width,
    },
    Enter {
        alloc_size: u16,
        nesting_level: u8,
    },
    Leave,
    CallNear {
        target: NearTarget,
    },
    CallFar {
        target: FarTarget,
    },
    RetNear {
        pop_bytes: u16,
    },
    RetFar {
        pop_bytes: u16,
    },
    Jcc {
        cond: Condition,
        target_rel: i32,
    },
    Jcxz {
        use_ecx: bool,
        target_rel: i8,
    },
    JmpNear {
        target: NearTarget,
    },
    JmpFar {
        target: FarTarget,
    },
    Loop {
        kind: LoopKind,
        use_ecx: bool,
        target_rel: i8,
    },
    StringOp {
        op: StringOpKind,
        width: Width,
        rep: Option<RepPrefix>,
        segment: SegReg,
    },
    FlagControl(FlagCtlOp),
    Int {
        vector: u8,
    },
    IntO,
    Iret {
        width: Width,
    },
    Salc,
    Hlt,
    FpuStub {
        op: FpuStubOp,
        mem: Option<Operand>,
    },
    Cpuid,
    IoPort {
        op: InOutOp,
        port: PortOperand,
        width: Width,
    },
    Nop,
    InvalidOpcode {
        opcode_bytes: Vec<u8>,
    },
}

/// A register operand whose width is 16 or 32 bits depending on the
/// operand-size prefix; several instructions (`LEA`, `MOVSX`, `BSWAP`'s
/// sibling `LxS` loads) name the destination this way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg32OrReg16 {
    R16(Reg16),
    R32(Reg32),
}
