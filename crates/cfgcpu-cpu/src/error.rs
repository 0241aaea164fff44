/// Faults raised while executing a `CfgInstruction`.
///
/// `InvalidOpcode` and `DivideError` are guest-observable: the execution
/// helper converts them into an interrupt delivery on the spot and never lets
/// them unwind past `Execute::execute`. `UnhandledOperation` and
/// `CacheInvariantViolation` are host-internal programming errors; they
/// propagate out of the CPU step and the outer loop stops the machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuFault {
    #[error("invalid opcode at {address}: {opcode_bytes:02x?}")]
    InvalidOpcode {
        address: cfgcpu_types::SegmentedAddress,
        opcode_bytes: Vec<u8>,
    },

    #[error("divide error at {address}")]
    DivideError { address: cfgcpu_types::SegmentedAddress },

    #[error("unhandled operation: {detail}")]
    UnhandledOperation { detail: String },

    #[error("cache invariant violation: {detail}")]
    CacheInvariantViolation { detail: String },
}

impl CpuFault {
    /// The real-mode interrupt vector a guest-observable fault is delivered
    /// through, or `None` for the host-internal variants.
    pub fn guest_vector(&self) -> Option<u8> {
        match self {
            CpuFault::InvalidOpcode { .. } => Some(6),
            CpuFault::DivideError { .. } => Some(0),
            CpuFault::UnhandledOperation { .. } | CpuFault::CacheInvariantViolation { .. } => None,
        }
    }
}
