/// Decode-time failure. The public `InstructionParser` (in `cfgcpu-isa`)
/// never propagates this: it is caught at the opcode-table boundary and
/// turned into an `Invalid`/incomplete `CfgInstruction` instead, so parsing
/// itself stays infallible per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("instruction stream truncated: needed {needed} more byte(s)")]
    Truncated { needed: u8 },
    #[error("instruction exceeds the 15-byte architectural length limit")]
    TooLong,
}
