//! `CfgInstruction` and its variant family: the parsed, semantically typed
//! representation every other crate in the workspace builds on. `cfgcpu-cpu`
//! executes these; `cfgcpu-breakpoints` inspects them; the printers in this
//! crate render them back to text.

mod asm;
mod ast;
mod instruction;
mod kind;
mod operand;
mod parser;

pub use asm::ToAssemblyString;
pub use ast::{InstructionAst, ToInstructionAst, OperandAst};
pub use instruction::{CfgInstruction, FieldRole, RawField, SuccessorType};
pub use kind::*;
pub use operand::{Condition, Operand, Width};
pub use parser::{parse, parse_instruction};
