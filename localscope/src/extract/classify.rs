//! Single-pass classification of name-referencing instructions.
//!
//! Every read is tagged with its binding source using only the code object's
//! own tables: local slots (parameters first), cell/free slots and the name
//! table. Nothing is re-derived from source text.

use crate::error::ExtractError;
use localscope_bytecode::{ClosureSlot, CodeObject, Constant, Instruction, Opcode, Register};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::trace;

/// Binding source of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRef<'a> {
    /// Local variable or cell owned by this frame.
    Local(&'a Arc<str>),
    /// One of the frame's own parameters.
    Parameter(&'a Arc<str>),
    /// Captured from an enclosing frame.
    Free(&'a Arc<str>),
    /// Module namespace or builtins.
    Global(&'a Arc<str>),
    /// Attribute read off the value in `obj`.
    Attribute { obj: Register, name: &'a Arc<str> },
}

/// A classified read: instruction index, destination register, source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified<'a> {
    pub pc: usize,
    pub dst: Register,
    pub reference: NameRef<'a>,
}

/// Classify every read in `code`, validating each instruction's operands.
///
/// Stores and deletes are validated but never produce a read.
pub fn classify(code: &CodeObject) -> Result<Vec<Classified<'_>>, ExtractError> {
    let frame_names = frame_bound_names(code)?;
    let params = code.parameter_count();
    let mut reads = Vec::new();

    for (pc, &inst) in code.instructions.iter().enumerate() {
        let Some(opcode) = inst.decode() else {
            return Err(ExtractError::UnknownOpcode {
                qualname: code.qualname.clone(),
                pc,
                opcode: inst.opcode(),
            });
        };
        trace!(qualname = %code.qualname, pc, %inst, "classify");

        let reference = match opcode {
            Opcode::LoadLocal => {
                let slot = inst.imm16();
                let name = lookup(code, pc, "local", &code.locals, slot)?;
                if (slot as usize) < params {
                    NameRef::Parameter(name)
                } else {
                    NameRef::Local(name)
                }
            }
            Opcode::LoadClosure => match closure_slot(code, pc, inst.imm16())? {
                ClosureSlot::Cell(name) => NameRef::Local(name),
                ClosureSlot::Free(name) => NameRef::Free(name),
            },
            Opcode::LoadGlobal => NameRef::Global(name_at(code, pc, inst.imm16())?),
            Opcode::LoadName => {
                let name = name_at(code, pc, inst.imm16())?;
                if frame_names.contains(name) {
                    NameRef::Local(name)
                } else {
                    NameRef::Global(name)
                }
            }
            Opcode::GetAttr | Opcode::LoadMethod => NameRef::Attribute {
                obj: inst.src1(),
                name: name_at(code, pc, inst.name8() as u16)?,
            },
            Opcode::StoreLocal | Opcode::DeleteLocal => {
                lookup(code, pc, "local", &code.locals, inst.imm16())?;
                continue;
            }
            Opcode::StoreClosure | Opcode::DeleteClosure => {
                closure_slot(code, pc, inst.imm16())?;
                continue;
            }
            Opcode::StoreGlobal
            | Opcode::DeleteGlobal
            | Opcode::StoreName
            | Opcode::DeleteName
            | Opcode::ImportName => {
                name_at(code, pc, inst.imm16())?;
                continue;
            }
            Opcode::SetAttr | Opcode::DelAttr => {
                name_at(code, pc, inst.name8() as u16)?;
                continue;
            }
            Opcode::LoadConst => {
                constant_at(code, pc, inst)?;
                continue;
            }
            Opcode::MakeFunction | Opcode::MakeClosure => {
                let constant = constant_at(code, pc, inst)?;
                if constant.as_code().is_none() {
                    return Err(ExtractError::NotCode {
                        qualname: code.qualname.clone(),
                        pc,
                        kind: constant.kind_name(),
                    });
                }
                continue;
            }
            _ => continue,
        };

        reads.push(Classified {
            pc,
            dst: inst.dst(),
            reference,
        });
    }

    Ok(reads)
}

/// Names the frame binds through its dynamic namespace (`StoreName`/`DeleteName`).
///
/// A `LoadName` of any of these is local for the whole frame, even when it
/// executes before the binding.
fn frame_bound_names(code: &CodeObject) -> Result<FxHashSet<&Arc<str>>, ExtractError> {
    let mut names = FxHashSet::default();
    for (pc, inst) in code.instructions.iter().enumerate() {
        if matches!(inst.decode(), Some(Opcode::StoreName | Opcode::DeleteName)) {
            names.insert(name_at(code, pc, inst.imm16())?);
        }
    }
    Ok(names)
}

fn lookup<'a>(
    code: &CodeObject,
    pc: usize,
    table: &'static str,
    entries: &'a [Arc<str>],
    index: u16,
) -> Result<&'a Arc<str>, ExtractError> {
    entries
        .get(index as usize)
        .ok_or_else(|| ExtractError::IndexOutOfRange {
            qualname: code.qualname.clone(),
            pc,
            table,
            index,
        })
}

#[inline]
fn name_at(code: &CodeObject, pc: usize, index: u16) -> Result<&Arc<str>, ExtractError> {
    lookup(code, pc, "name", &code.names, index)
}

fn closure_slot(code: &CodeObject, pc: usize, slot: u16) -> Result<ClosureSlot<'_>, ExtractError> {
    code.closure_slot(slot)
        .ok_or_else(|| ExtractError::IndexOutOfRange {
            qualname: code.qualname.clone(),
            pc,
            table: "closure",
            index: slot,
        })
}

fn constant_at(code: &CodeObject, pc: usize, inst: Instruction) -> Result<&Constant, ExtractError> {
    let index = inst.imm16();
    code.constants
        .get(index as usize)
        .ok_or_else(|| ExtractError::IndexOutOfRange {
            qualname: code.qualname.clone(),
            pc,
            table: "constant",
            index,
        })
}
