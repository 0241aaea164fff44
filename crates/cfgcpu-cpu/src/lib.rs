//! Register/flag execution semantics, the instruction cache feeder, and the
//! CFG arena. This crate turns `cfgcpu-isa`'s parsed
//! `CfgInstruction`s into actual side effects on a `State` and a
//! `MemoryBus`, keyed off the same segmented addresses the decoder and ISA
//! crates use, and owns the self-modifying-code-aware cache (§4.2) that sits
//! in front of the parser on every fetch.

mod alu;
mod bus;
mod cfg;
mod error;
mod execute;
mod feeder;
mod helper;
mod interrupt;
mod model;
mod modrm;
mod stack;
pub mod stats;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use bus::MemoryBus;
pub use cfg::{CfgArena, CfgNode, CfgNodeKind, DiscriminatedNode, NodeId};
pub use error::CpuFault;
pub use feeder::InstructionsFeeder;
pub use helper::ExecutionHelper;
pub use interrupt::{CallbackHandler, InterruptVectorTable, NullCallbackHandler};
pub use model::CpuModelInfo;
pub use stats::Stats;

/// Low-level ALU/stack/ModRM primitives, exposed for callers (the facade
/// crate, or a debugger) that need to resolve an operand or replay a flag
/// computation outside of a live `execute` call.
pub mod ops {
    pub use crate::alu::*;
    pub use crate::modrm::{effective_address, effective_offset, load_effective_address, read, write};
    pub use crate::stack::{pop, push};
}
