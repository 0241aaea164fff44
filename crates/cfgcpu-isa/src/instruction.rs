use crate::kind::{InstructionKind, NearTarget};
use cfgcpu_decoder::PrefixSet;
use cfgcpu_types::{InstructionField, SegmentedAddress};

/// Which byte range of a parsed instruction a `RawField` covers: prefixes,
/// one or two opcode bytes, an optional ModRM(+SIB+displacement), then an
/// instruction-specific immediate, in that consumption order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Prefix,
    Opcode,
    ModRm,
    Displacement,
    Immediate,
}

pub type RawField = InstructionField<FieldRole>;

/// The CFG successor classification: distinguishes a CALL's static
/// fall-through from its dynamically-matched RET, and a regular
/// taken/not-taken branch from an interrupt's push/return pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuccessorType {
    Normal,
    CallToRet,
    Jump,
    InterruptCall,
    InterruptRet,
}

/// One parsed instruction: its origin address, the ordered byte-range
/// fields that cover it, any legacy prefixes, and its semantic `kind`.
///
/// Invariants: `fields.iter().map(|f| f.length).sum::<u8>() ==
/// length`, and `address.advance(length) == next_in_memory_address()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgInstruction {
    pub address: SegmentedAddress,
    pub prefixes: PrefixSet,
    pub fields: Vec<RawField>,
    pub kind: InstructionKind,
    pub length: u8,
    /// The exact bytes this instruction was parsed from, `fields`-length
    /// many. The feeder (`cfgcpu-cpu`) diffs slices of this against live
    /// memory to decide whether a cached instruction's *identity* (its
    /// final fields) still matches the guest's current bytes, without
    /// re-parsing.
    pub raw_bytes: Vec<u8>,
}

impl CfgInstruction {
    pub fn next_in_memory_address(&self) -> SegmentedAddress {
        self.address.advance(self.length as u16)
    }

    /// `(offset, length)` pairs, relative to `self.address`, covering every
    /// final (identity) field — the byte ranges that must still match
    /// memory for this cached instruction to remain valid.
    pub fn final_byte_spans(&self) -> Vec<(u16, u8)> {
        self.final_fields()
            .map(|f| (f.address.offset.wrapping_sub(self.address.offset), f.length))
            .collect()
    }

    /// The instruction's immutable identity bytes: prefixes, opcode, and
    /// ModRM/SIB (everything `RawField`'s `is_final` flag marks `true`).
    /// Two parses at the same address with equal final bytes are the same
    /// instruction *shape*, even if their displacement/immediate values
    /// differ (see the feeder's discriminator reduction in `cfgcpu-cpu`).
    pub fn final_fields(&self) -> impl Iterator<Item = &RawField> {
        self.fields.iter().filter(|f| f.is_final)
    }

    pub fn non_final_fields(&self) -> impl Iterator<Item = &RawField> {
        self.fields.iter().filter(|f| !f.is_final)
    }

    /// Whether this instruction is a call (near or far), for CFG wiring: its
    /// taken edge is `SuccessorType::CallToRet`-eligible and its
    /// fall-through is the return site.
    pub fn is_call(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::CallNear { .. } | InstructionKind::CallFar { .. }
        )
    }

    pub fn is_return(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::RetNear { .. } | InstructionKind::RetFar { .. } | InstructionKind::Iret { .. }
        )
    }

    /// Whether control flow only ever continues to the static
    /// next-in-memory address (no alternate successor to register).
    pub fn falls_through_only(&self) -> bool {
        !matches!(
            self.kind,
            InstructionKind::CallNear { .. }
                | InstructionKind::CallFar { .. }
                | InstructionKind::JmpNear { .. }
                | InstructionKind::JmpFar { .. }
                | InstructionKind::Jcc { .. }
                | InstructionKind::Jcxz { .. }
                | InstructionKind::Loop { .. }
                | InstructionKind::RetNear { .. }
                | InstructionKind::RetFar { .. }
                | InstructionKind::Int { .. }
                | InstructionKind::IntO
                | InstructionKind::Iret { .. }
                | InstructionKind::Hlt
        )
    }

    /// For direct (non-indirect, non-far-pointer-in-memory) control
    /// transfers, the statically known target address — used to populate
    /// `successors_per_address` without waiting for execution.
    pub fn static_branch_target(&self) -> Option<SegmentedAddress> {
        let next = self.next_in_memory_address();
        match &self.kind {
            InstructionKind::JmpNear {
                target: NearTarget::Relative(rel),
            }
            | InstructionKind::CallNear {
                target: NearTarget::Relative(rel),
            } => Some(next.advance(*rel as i16 as u16)),
            InstructionKind::Jcc { target_rel, .. } => Some(next.advance(*target_rel as i16 as u16)),
            InstructionKind::Jcxz { target_rel, .. } => Some(next.advance(*target_rel as i16 as u16)),
            InstructionKind::Loop { target_rel, .. } => Some(next.advance(*target_rel as i16 as u16)),
            _ => None,
        }
    }
}
