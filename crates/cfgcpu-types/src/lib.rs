//! Fundamental types shared by the decoder, ISA, and CPU crates: the
//! segmented real-mode address, the register file, the FLAGS bit layout,
//! and `InstructionField`, the byte-range bookkeeping used for self-modifying
//! code detection.

mod address;
mod fields;
mod flags;
mod registers;

pub use address::SegmentedAddress;
pub use fields::InstructionField;
pub use flags::Flags;
pub use registers::{Reg16, Reg32, Reg8, SegReg, State};
