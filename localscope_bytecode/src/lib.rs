//! Register-based compiled callable representation.
//!
//! This crate provides the compiled form that localscope analyzes without
//! executing it. Key components:
//!
//! - [`Instruction`] - 32-bit packed instruction format
//! - [`Opcode`] - Enumeration of all bytecode operations
//! - [`CodeObject`] - Compiled function representation with its name tables
//! - [`Constant`] - Constant pool entries, including nested code objects
//! - [`FunctionBuilder`] - High-level API for bytecode construction

mod builder;
mod code_object;
mod constant;
mod instruction;

pub use builder::{BuildError, FunctionBuilder, Label};
pub use code_object::{ClosureSlot, CodeFlags, CodeObject, LineTableEntry, disassemble};
pub use constant::Constant;
pub use instruction::{ConstIndex, Instruction, InstructionFormat, LocalSlot, Opcode, Register};
