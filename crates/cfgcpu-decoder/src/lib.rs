//! Low-level byte-stream primitives shared by `cfgcpu-isa`'s opcode table:
//! a bounds-checked cursor, legacy prefix aggregation, and ModRM/SIB/
//! displacement decoding. This crate knows nothing about instruction
//! semantics (mnemonics, operand meaning) — that belongs to `cfgcpu-isa`,
//! which turns these primitives into `CfgInstruction`s.

mod cursor;
mod error;
mod modrm;
mod prefix;

pub use cursor::Cursor;
pub use error::DecodeError;
pub use modrm::{parse_modrm, Base16, ModRmContext};
pub use prefix::{parse_prefixes, resolve_rep_for_compare, PrefixSet, RepPrefix};
