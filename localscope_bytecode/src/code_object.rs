//! Code object representation for compiled callables.
//!
//! A `CodeObject` is the unit the scope analysis works on: the instruction
//! stream plus every table needed to tell where a referenced name is bound.

use super::constant::Constant;
use super::instruction::Instruction;
use rustc_hash::FxHasher;
use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A compiled function, comprehension, generator expression or class body.
///
/// Code objects are immutable once built and can be shared across threads.
/// They contain:
/// - Bytecode instructions
/// - Constant pool (including nested code objects)
/// - Name tables (locals, globals/attributes, cells, free variables)
/// - Debug information
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeObject {
    /// Function name (`<listcomp>`, `<genexpr>`, `<lambda>` for anonymous code).
    pub name: Arc<str>,

    /// Qualified name (includes enclosing class/function names).
    pub qualname: Arc<str>,

    /// Filename where this code was defined.
    pub filename: Arc<str>,

    /// First line number in source.
    pub first_lineno: u32,

    /// Bytecode instructions (32-bit each).
    pub instructions: Box<[Instruction]>,

    /// Constant pool (indexed by LoadConst, MakeFunction, MakeClosure).
    pub constants: Box<[Constant]>,

    /// Local variable names. Parameters come first, in declaration order:
    /// positional, `*args`, keyword-only, `**kwargs`.
    pub locals: Box<[Arc<str>]>,

    /// Global/attribute name strings (indexed by LoadGlobal, LoadName, GetAttr, ...).
    pub names: Box<[Arc<str>]>,

    /// Free variable names (captured from an enclosing scope).
    pub freevars: Box<[Arc<str>]>,

    /// Cell variable names (locals captured by nested scopes).
    pub cellvars: Box<[Arc<str>]>,

    /// Number of positional parameters.
    pub arg_count: u16,

    /// Number of positional-only parameters.
    pub posonlyarg_count: u16,

    /// Number of keyword-only parameters.
    pub kwonlyarg_count: u16,

    /// Number of virtual registers used.
    pub register_count: u16,

    /// Code flags.
    pub flags: CodeFlags,

    /// Line number table (instruction index -> line number).
    pub line_table: Box<[LineTableEntry]>,
}

/// Code object flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CodeFlags(u32);

impl CodeFlags {
    /// No flags.
    pub const NONE: CodeFlags = CodeFlags(0);
    /// Function uses *args.
    pub const VARARGS: CodeFlags = CodeFlags(1 << 0);
    /// Function uses **kwargs.
    pub const VARKEYWORDS: CodeFlags = CodeFlags(1 << 1);
    /// Function is a generator.
    pub const GENERATOR: CodeFlags = CodeFlags(1 << 2);
    /// Function is a coroutine.
    pub const COROUTINE: CodeFlags = CodeFlags(1 << 3);
    /// Function is an async generator.
    pub const ASYNC_GENERATOR: CodeFlags = CodeFlags(1 << 4);
    /// Function is nested.
    pub const NESTED: CodeFlags = CodeFlags(1 << 5);
    /// This is module-level code.
    pub const MODULE: CodeFlags = CodeFlags(1 << 8);
    /// List/set/dict comprehension or generator expression.
    pub const COMPREHENSION: CodeFlags = CodeFlags(1 << 9);
    /// Class body. Its locals are invisible to nested scopes.
    pub const CLASS_BODY: CodeFlags = CodeFlags(1 << 10);
    /// Deferred annotation evaluator; runs in the defining scope, not at call time.
    pub const ANNOTATION: CodeFlags = CodeFlags(1 << 11);

    /// Check if a flag is set.
    #[inline]
    pub const fn contains(self, other: CodeFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Combine flags.
    #[inline]
    pub const fn union(self, other: CodeFlags) -> CodeFlags {
        CodeFlags(self.0 | other.0)
    }

    /// Get raw value.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for CodeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for CodeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Line table entry mapping instruction ranges to source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineTableEntry {
    /// Starting instruction index (inclusive).
    pub start_pc: u32,
    /// Ending instruction index (exclusive).
    pub end_pc: u32,
    /// Source line number.
    pub line: u32,
}

/// A closure slot resolved against a code object's cell and free tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureSlot<'a> {
    /// Cell owned by this frame.
    Cell(&'a Arc<str>),
    /// Free variable captured from an enclosing frame.
    Free(&'a Arc<str>),
}

impl CodeObject {
    /// Create a new empty code object.
    pub fn new(name: impl Into<Arc<str>>, filename: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        CodeObject {
            qualname: name.clone(),
            name,
            filename: filename.into(),
            first_lineno: 1,
            instructions: Box::new([]),
            constants: Box::new([]),
            locals: Box::new([]),
            names: Box::new([]),
            freevars: Box::new([]),
            cellvars: Box::new([]),
            arg_count: 0,
            posonlyarg_count: 0,
            kwonlyarg_count: 0,
            register_count: 0,
            flags: CodeFlags::NONE,
            line_table: Box::new([]),
        }
    }

    /// Get the line number for a given instruction index.
    pub fn line_for_pc(&self, pc: u32) -> Option<u32> {
        self.line_table
            .iter()
            .find(|entry| entry.start_pc <= pc && pc < entry.end_pc)
            .map(|entry| entry.line)
    }

    /// Last source line covered by this code or any code nested in it.
    pub fn last_lineno(&self) -> u32 {
        let own = self.line_table.iter().map(|entry| entry.line).max();
        self.nested_code()
            .map(|nested| nested.last_lineno())
            .chain(own)
            .max()
            .unwrap_or(self.first_lineno)
            .max(self.first_lineno)
    }

    #[inline]
    pub fn is_class_body(&self) -> bool {
        self.flags.contains(CodeFlags::CLASS_BODY)
    }

    #[inline]
    pub fn is_module(&self) -> bool {
        self.flags.contains(CodeFlags::MODULE)
    }

    #[inline]
    pub fn is_annotation(&self) -> bool {
        self.flags.contains(CodeFlags::ANNOTATION)
    }

    /// Get the total parameter count (positional + keyword-only).
    #[inline]
    pub fn total_params(&self) -> u16 {
        self.arg_count + self.kwonlyarg_count
    }

    /// Number of leading `locals` entries that are parameters, including
    /// `*args` and `**kwargs`.
    pub fn parameter_count(&self) -> usize {
        let mut count = self.total_params() as usize;
        if self.flags.contains(CodeFlags::VARARGS) {
            count += 1;
        }
        if self.flags.contains(CodeFlags::VARKEYWORDS) {
            count += 1;
        }
        count.min(self.locals.len())
    }

    /// Parameter names in `locals` order: positional, keyword-only, `*args`,
    /// `**kwargs`.
    #[inline]
    pub fn parameter_names(&self) -> &[Arc<str>] {
        &self.locals[..self.parameter_count()]
    }

    /// Get number of closure variables (free + cell).
    #[inline]
    pub fn closure_size(&self) -> usize {
        self.freevars.len() + self.cellvars.len()
    }

    /// Resolve a closure slot. Cells are indexed first, free variables after.
    pub fn closure_slot(&self, slot: u16) -> Option<ClosureSlot<'_>> {
        let slot = slot as usize;
        match self.cellvars.get(slot) {
            Some(name) => Some(ClosureSlot::Cell(name)),
            None => self
                .freevars
                .get(slot - self.cellvars.len())
                .map(ClosureSlot::Free),
        }
    }

    /// Nested code objects in the constant pool, in pool order.
    pub fn nested_code(&self) -> impl Iterator<Item = &Arc<CodeObject>> {
        self.constants.iter().filter_map(Constant::as_code)
    }

    /// Content fingerprint over instructions, tables, constants and nested code.
    ///
    /// Stable across runs and independent of where the object lives in memory.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Disassemble a code object (and everything nested in it) to a string.
pub fn disassemble(code: &CodeObject) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail.
    let _ = write_disassembly(&mut output, code, 0);
    output
}

fn write_disassembly(out: &mut String, code: &CodeObject, depth: usize) -> fmt::Result {
    let pad = "    ".repeat(depth);

    writeln!(out, "{pad}Code object: {} ({})", code.name, code.qualname)?;
    writeln!(out, "{pad}  File: {}", code.filename)?;
    writeln!(out, "{pad}  First line: {}", code.first_lineno)?;
    writeln!(
        out,
        "{pad}  Args: {} (pos-only: {}, kw-only: {})",
        code.arg_count, code.posonlyarg_count, code.kwonlyarg_count
    )?;
    writeln!(out, "{pad}  Registers: {}", code.register_count)?;
    writeln!(out, "{pad}  Flags: {:08x}", code.flags.bits())?;

    write_table(out, &pad, "Constants", code.constants.iter())?;
    write_table(out, &pad, "Names", code.names.iter())?;
    write_table(out, &pad, "Locals", code.locals.iter())?;
    write_table(out, &pad, "Cell variables", code.cellvars.iter())?;
    write_table(out, &pad, "Free variables", code.freevars.iter())?;

    writeln!(out, "\n{pad}Disassembly:")?;
    for (i, inst) in code.instructions.iter().enumerate() {
        match code.line_for_pc(i as u32) {
            Some(line) => write!(out, "{pad}{line:4}")?,
            None => write!(out, "{pad}    ")?,
        }
        writeln!(out, " {i:4}: {inst}")?;
    }

    for nested in code.nested_code() {
        writeln!(out)?;
        write_disassembly(out, nested, depth + 1)?;
    }
    Ok(())
}

fn write_table<T: fmt::Display>(
    out: &mut String,
    pad: &str,
    title: &str,
    items: impl ExactSizeIterator<Item = T>,
) -> fmt::Result {
    if items.len() == 0 {
        return Ok(());
    }
    writeln!(out, "\n{pad}{title}:")?;
    for (i, item) in items.enumerate() {
        writeln!(out, "{pad}  {i:4}: {item}")?;
    }
    Ok(())
}
