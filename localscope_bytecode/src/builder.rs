//! Function builder for bytecode emission.
//!
//! The `FunctionBuilder` provides a high-level API for constructing code
//! objects with register allocation, label resolution and interned name
//! tables. Compiler front-ends and tests use it to produce the compiled
//! representation the scope analysis consumes.

use super::code_object::{CodeFlags, CodeObject, LineTableEntry};
use super::constant::Constant;
use super::instruction::{ConstIndex, Instruction, LocalSlot, Opcode, Register};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// A label for jump targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A forward reference to a label that needs patching.
#[derive(Debug)]
struct ForwardRef {
    /// Instruction index containing the jump.
    instruction_index: usize,
    /// The label being jumped to.
    label: Label,
}

/// Errors detected while building a code object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("more than 256 registers requested in `{0}`")]
    RegisterOverflow(Arc<str>),
    #[error("attribute name index {index} does not fit in an 8-bit operand in `{code}`")]
    AttributeIndexOverflow { code: Arc<str>, index: u16 },
    #[error("cell variable `{name}` declared after free variables in `{code}`")]
    CellAfterFree { code: Arc<str>, name: Arc<str> },
    #[error("label {label} used but never bound in `{code}`")]
    UnboundLabel { code: Arc<str>, label: u32 },
}

/// Builder for constructing code objects.
///
/// # Example
/// ```
/// use localscope_bytecode::FunctionBuilder;
///
/// // def scale(x): return x / sigma
/// let mut builder = FunctionBuilder::new("scale");
/// builder.set_filename("model.py");
/// builder.set_arg_count(1);
/// let x = builder.define_local("x");
/// let sigma = builder.add_name("sigma");
///
/// let r0 = builder.alloc_register();
/// let r1 = builder.alloc_register();
/// builder.emit_load_local(r0, x);
/// builder.emit_load_global(r1, sigma);
/// builder.emit_div(r0, r0, r1);
/// builder.emit_return(r0);
///
/// let code = builder.finish().unwrap();
/// assert_eq!(code.instructions.len(), 4);
/// ```
pub struct FunctionBuilder {
    /// Function name.
    name: Arc<str>,
    /// Qualified name.
    qualname: Arc<str>,
    /// Filename.
    filename: Arc<str>,
    /// First line number.
    first_lineno: u32,
    /// Current line number (for line table).
    current_line: u32,

    /// Emitted instructions.
    instructions: Vec<Instruction>,

    /// Constant pool.
    constants: Vec<Constant>,
    /// Constant deduplication map.
    constant_map: FxHashMap<ConstantKey, ConstIndex>,

    /// Local variable names.
    locals: Vec<Arc<str>>,
    /// Local name to slot map.
    local_map: FxHashMap<Arc<str>, LocalSlot>,

    /// Global/attribute names.
    names: Vec<Arc<str>>,
    /// Name to index map.
    name_map: FxHashMap<Arc<str>, u16>,

    /// Free variable names.
    freevars: Vec<Arc<str>>,
    /// Cell variable names.
    cellvars: Vec<Arc<str>>,

    /// Number of parameters.
    arg_count: u16,
    posonlyarg_count: u16,
    kwonlyarg_count: u16,

    /// Code flags.
    flags: CodeFlags,

    /// Next register to allocate.
    next_register: u16,
    /// Maximum registers used (high water mark).
    max_registers: u16,
    /// Register free list for reuse.
    free_registers: Vec<Register>,

    /// Label counter.
    next_label: u32,
    /// Label to instruction index map.
    labels: FxHashMap<Label, usize>,
    /// Forward references that need patching.
    forward_refs: Vec<ForwardRef>,

    /// Line number table entries.
    line_table: Vec<LineTableEntry>,
    /// Start PC for current line.
    line_start_pc: u32,

    /// First error hit while emitting; reported by `finish`.
    error: Option<BuildError>,
}

/// Key type for constant deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    None,
    Bool(bool),
    Int(i64),
    /// Float bits for exact comparison.
    Float(u64),
    Str(Arc<str>),
}

impl ConstantKey {
    fn from_constant(value: &Constant) -> Option<Self> {
        // Only scalar constants are deduplicated; code objects never are.
        match value {
            Constant::None => Some(ConstantKey::None),
            Constant::Bool(b) => Some(ConstantKey::Bool(*b)),
            Constant::Int(i) => Some(ConstantKey::Int(*i)),
            Constant::Float(f) => Some(ConstantKey::Float(f.to_bits())),
            Constant::Str(s) => Some(ConstantKey::Str(s.clone())),
            Constant::Tuple(_) | Constant::Code(_) => None,
        }
    }
}

impl FunctionBuilder {
    /// Create a new function builder.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        Self {
            qualname: name.clone(),
            name,
            filename: "<unknown>".into(),
            first_lineno: 1,
            current_line: 1,
            instructions: Vec::new(),
            constants: Vec::new(),
            constant_map: FxHashMap::default(),
            locals: Vec::new(),
            local_map: FxHashMap::default(),
            names: Vec::new(),
            name_map: FxHashMap::default(),
            freevars: Vec::new(),
            cellvars: Vec::new(),
            arg_count: 0,
            posonlyarg_count: 0,
            kwonlyarg_count: 0,
            flags: CodeFlags::NONE,
            next_register: 0,
            max_registers: 0,
            free_registers: Vec::new(),
            next_label: 0,
            labels: FxHashMap::default(),
            forward_refs: Vec::new(),
            line_table: Vec::new(),
            line_start_pc: 0,
            error: None,
        }
    }

    /// Create a builder for code nested inside `parent`, inheriting its
    /// filename and deriving the qualified name (`outer.<locals>.inner`).
    pub fn nested(parent: &FunctionBuilder, name: impl Into<Arc<str>>) -> Self {
        let mut builder = Self::new(name);
        builder.filename = parent.filename.clone();
        builder.qualname = if parent.flags.contains(CodeFlags::CLASS_BODY) {
            format!("{}.{}", parent.qualname, builder.name).into()
        } else {
            format!("{}.<locals>.{}", parent.qualname, builder.name).into()
        };
        builder.set_first_lineno(parent.current_line);
        builder.flags |= CodeFlags::NESTED;
        builder
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Set the qualified name.
    pub fn set_qualname(&mut self, qualname: impl Into<Arc<str>>) {
        self.qualname = qualname.into();
    }

    /// Set the filename.
    pub fn set_filename(&mut self, filename: impl Into<Arc<str>>) {
        self.filename = filename.into();
    }

    /// Set the first line number.
    pub fn set_first_lineno(&mut self, line: u32) {
        self.first_lineno = line;
        self.current_line = line;
    }

    /// Set the current line number for subsequent instructions.
    pub fn set_line(&mut self, line: u32) {
        if line != self.current_line {
            // Record the previous line range
            let current_pc = self.instructions.len() as u32;
            if current_pc > self.line_start_pc {
                self.line_table.push(LineTableEntry {
                    start_pc: self.line_start_pc,
                    end_pc: current_pc,
                    line: self.current_line,
                });
            }
            self.current_line = line;
            self.line_start_pc = current_pc;
        }
    }

    /// Set the number of positional parameters.
    pub fn set_arg_count(&mut self, count: u16) {
        self.arg_count = count;
    }

    /// Set the number of keyword-only parameters.
    pub fn set_kwonlyarg_count(&mut self, count: u16) {
        self.kwonlyarg_count = count;
    }

    /// Add code flags.
    pub fn add_flags(&mut self, flags: CodeFlags) {
        self.flags |= flags;
    }

    /// Qualified name of the code being built.
    #[inline]
    pub fn qualname(&self) -> &Arc<str> {
        &self.qualname
    }

    // =========================================================================
    // Register Management
    // =========================================================================

    /// Allocate a new virtual register.
    #[inline]
    pub fn alloc_register(&mut self) -> Register {
        // Try to reuse a freed register first
        if let Some(reg) = self.free_registers.pop() {
            return reg;
        }

        if self.next_register > u8::MAX as u16 {
            self.fail(BuildError::RegisterOverflow(self.name.clone()));
            return Register(u8::MAX);
        }
        let reg = Register(self.next_register as u8);
        self.next_register += 1;
        self.max_registers = self.max_registers.max(self.next_register);
        reg
    }

    /// Free a register for reuse.
    #[inline]
    pub fn free_register(&mut self, reg: Register) {
        self.free_registers.push(reg);
    }

    // =========================================================================
    // Constant Pool
    // =========================================================================

    /// Add a constant and return its index.
    pub fn add_constant(&mut self, value: Constant) -> ConstIndex {
        let key = ConstantKey::from_constant(&value);
        if let Some(idx) = key.as_ref().and_then(|k| self.constant_map.get(k)) {
            return *idx;
        }
        let idx = ConstIndex::new(self.constants.len() as u16);
        self.constants.push(value);
        if let Some(key) = key {
            self.constant_map.insert(key, idx);
        }
        idx
    }

    /// Add an integer constant.
    pub fn add_int(&mut self, value: i64) -> ConstIndex {
        self.add_constant(Constant::Int(value))
    }

    /// Add a string constant.
    pub fn add_str(&mut self, value: impl Into<Arc<str>>) -> ConstIndex {
        self.add_constant(Constant::Str(value.into()))
    }

    /// Add a nested code object (function, comprehension, class body).
    pub fn add_code_object(&mut self, code: Arc<CodeObject>) -> ConstIndex {
        self.add_constant(Constant::Code(code))
    }

    // =========================================================================
    // Local Variables
    // =========================================================================

    /// Define a local variable and return its slot.
    ///
    /// Parameters must be defined first, in declaration order.
    pub fn define_local(&mut self, name: impl Into<Arc<str>>) -> LocalSlot {
        let name = name.into();
        if let Some(&slot) = self.local_map.get(&name) {
            return slot;
        }
        let slot = LocalSlot::new(self.locals.len() as u16);
        self.local_map.insert(name.clone(), slot);
        self.locals.push(name);
        slot
    }

    // =========================================================================
    // Closure Variables
    // =========================================================================

    /// Declare a cell variable (a local captured by nested code) and return
    /// its closure slot. Cells must be declared before any free variable.
    pub fn add_cellvar(&mut self, name: impl Into<Arc<str>>) -> u16 {
        let name = name.into();
        if let Some(pos) = self.cellvars.iter().position(|c| *c == name) {
            return pos as u16;
        }
        if !self.freevars.is_empty() {
            self.fail(BuildError::CellAfterFree {
                code: self.name.clone(),
                name: name.clone(),
            });
        }
        self.cellvars.push(name);
        (self.cellvars.len() - 1) as u16
    }

    /// Declare a free variable (captured from an enclosing scope) and return
    /// its closure slot.
    pub fn add_freevar(&mut self, name: impl Into<Arc<str>>) -> u16 {
        let name = name.into();
        if let Some(pos) = self.freevars.iter().position(|f| *f == name) {
            return (self.cellvars.len() + pos) as u16;
        }
        self.freevars.push(name);
        (self.cellvars.len() + self.freevars.len() - 1) as u16
    }

    // =========================================================================
    // Names (globals, attributes)
    // =========================================================================

    /// Add a name and return its index.
    pub fn add_name(&mut self, name: impl Into<Arc<str>>) -> u16 {
        let name = name.into();
        if let Some(&idx) = self.name_map.get(&name) {
            return idx;
        }
        let idx = self.names.len() as u16;
        self.name_map.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Create a new label for a jump target.
    pub fn create_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Mark the current position as the target for a label.
    pub fn bind_label(&mut self, label: Label) {
        let pc = self.instructions.len();
        self.labels.insert(label, pc);
    }

    // =========================================================================
    // Instruction Emission
    // =========================================================================

    /// Emit a raw instruction.
    #[inline]
    pub fn emit(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    /// Emit a NOP instruction.
    pub fn emit_nop(&mut self) {
        self.emit(Instruction::op(Opcode::Nop));
    }

    // --- Load/Store ---

    /// Load a constant into a register.
    pub fn emit_load_const(&mut self, dst: Register, idx: ConstIndex) {
        self.emit(Instruction::op_di(Opcode::LoadConst, dst, idx.0));
    }

    /// Load None into a register.
    pub fn emit_load_none(&mut self, dst: Register) {
        self.emit(Instruction::op_d(Opcode::LoadNone, dst));
    }

    /// Load a local variable into a register.
    pub fn emit_load_local(&mut self, dst: Register, slot: LocalSlot) {
        self.emit(Instruction::op_di(Opcode::LoadLocal, dst, slot.0));
    }

    /// Store a register into a local variable.
    pub fn emit_store_local(&mut self, slot: LocalSlot, src: Register) {
        self.emit(Instruction::op_di(Opcode::StoreLocal, src, slot.0));
    }

    /// Load a cell or free variable into a register.
    pub fn emit_load_closure(&mut self, dst: Register, slot: u16) {
        self.emit(Instruction::op_di(Opcode::LoadClosure, dst, slot));
    }

    /// Store a register into a cell or free variable.
    pub fn emit_store_closure(&mut self, slot: u16, src: Register) {
        self.emit(Instruction::op_di(Opcode::StoreClosure, src, slot));
    }

    /// Load a global variable into a register.
    pub fn emit_load_global(&mut self, dst: Register, name_idx: u16) {
        self.emit(Instruction::op_di(Opcode::LoadGlobal, dst, name_idx));
    }

    /// Store a register into a global variable.
    pub fn emit_store_global(&mut self, name_idx: u16, src: Register) {
        self.emit(Instruction::op_di(Opcode::StoreGlobal, src, name_idx));
    }

    /// Dynamic name lookup (class bodies): frame, then globals, then builtins.
    pub fn emit_load_name(&mut self, dst: Register, name_idx: u16) {
        self.emit(Instruction::op_di(Opcode::LoadName, dst, name_idx));
    }

    /// Bind a name in the frame's own namespace (class bodies).
    pub fn emit_store_name(&mut self, name_idx: u16, src: Register) {
        self.emit(Instruction::op_di(Opcode::StoreName, src, name_idx));
    }

    // --- Arithmetic ---

    /// Generic add: dst = src1 + src2.
    pub fn emit_add(&mut self, dst: Register, src1: Register, src2: Register) {
        self.emit(Instruction::op_dss(Opcode::Add, dst, src1, src2));
    }

    /// Generic multiply: dst = src1 * src2.
    pub fn emit_mul(&mut self, dst: Register, src1: Register, src2: Register) {
        self.emit(Instruction::op_dss(Opcode::Mul, dst, src1, src2));
    }

    /// Generic true divide: dst = src1 / src2.
    pub fn emit_div(&mut self, dst: Register, src1: Register, src2: Register) {
        self.emit(Instruction::op_dss(Opcode::TrueDiv, dst, src1, src2));
    }

    // --- Control Flow ---

    /// Return value from register.
    pub fn emit_return(&mut self, src: Register) {
        self.emit(Instruction::op_d(Opcode::Return, src));
    }

    /// Return None.
    pub fn emit_return_none(&mut self) {
        self.emit(Instruction::op(Opcode::ReturnNone));
    }

    /// Yield value from register (generators).
    pub fn emit_yield(&mut self, src: Register) {
        self.emit(Instruction::op_d(Opcode::Yield, src));
    }

    /// Unconditional jump to label.
    pub fn emit_jump(&mut self, label: Label) {
        self.emit_branch(Opcode::Jump, Register(0), label);
    }

    /// Jump if register is falsy.
    pub fn emit_jump_if_false(&mut self, src: Register, label: Label) {
        self.emit_branch(Opcode::JumpIfFalse, src, label);
    }

    /// Jump if register is truthy.
    pub fn emit_jump_if_true(&mut self, src: Register, label: Label) {
        self.emit_branch(Opcode::JumpIfTrue, src, label);
    }

    fn emit_branch(&mut self, opcode: Opcode, reg: Register, label: Label) {
        let inst_idx = self.instructions.len();
        // Emit placeholder, patched in `finish`
        self.emit(Instruction::op_d(opcode, reg));
        self.forward_refs.push(ForwardRef {
            instruction_index: inst_idx,
            label,
        });
    }

    // --- Object Operations ---

    /// Get attribute: dst = obj.attr.
    pub fn emit_get_attr(&mut self, dst: Register, obj: Register, name_idx: u16) {
        let name = self.attr_operand(name_idx);
        self.emit(Instruction::op_dsn(Opcode::GetAttr, dst, obj, name));
    }

    /// Set attribute: obj.attr = src.
    pub fn emit_set_attr(&mut self, obj: Register, src: Register, name_idx: u16) {
        let name = self.attr_operand(name_idx);
        self.emit(Instruction::op_dsn(Opcode::SetAttr, obj, src, name));
    }

    /// Load a method for an immediate call: dst = obj.attr.
    pub fn emit_load_method(&mut self, dst: Register, obj: Register, name_idx: u16) {
        let name = self.attr_operand(name_idx);
        self.emit(Instruction::op_dsn(Opcode::LoadMethod, dst, obj, name));
    }

    fn attr_operand(&mut self, name_idx: u16) -> u8 {
        match u8::try_from(name_idx) {
            Ok(idx) => idx,
            Err(_) => {
                self.fail(BuildError::AttributeIndexOverflow {
                    code: self.name.clone(),
                    index: name_idx,
                });
                0
            }
        }
    }

    // --- Function Calls ---

    /// Call function: dst = func(args...).
    /// Args should be in registers dst+1, dst+2, etc.
    pub fn emit_call(&mut self, dst: Register, func: Register, argc: u8) {
        self.emit(Instruction::new(Opcode::Call, dst.0, func.0, argc));
    }

    /// Call a method loaded by `LoadMethod`.
    pub fn emit_call_method(&mut self, dst: Register, method: Register, argc: u8) {
        self.emit(Instruction::new(Opcode::CallMethod, dst.0, method.0, argc));
    }

    /// Create a function object from a nested code constant.
    pub fn emit_make_function(&mut self, dst: Register, code: ConstIndex) {
        self.emit(Instruction::op_di(Opcode::MakeFunction, dst, code.0));
    }

    /// Create a closure from a nested code constant, capturing this frame's cells.
    pub fn emit_make_closure(&mut self, dst: Register, code: ConstIndex) {
        self.emit(Instruction::op_di(Opcode::MakeClosure, dst, code.0));
    }

    // --- Container Operations ---

    /// Build list from registers.
    pub fn emit_build_list(&mut self, dst: Register, start: Register, count: u8) {
        self.emit(Instruction::new(Opcode::BuildList, dst.0, start.0, count));
    }

    /// Append to the list under construction in a comprehension.
    pub fn emit_list_append(&mut self, list: Register, value: Register) {
        self.emit(Instruction::op_ds(Opcode::ListAppend, list, value));
    }

    /// Get iterator: dst = iter(src).
    pub fn emit_get_iter(&mut self, dst: Register, src: Register) {
        self.emit(Instruction::op_ds(Opcode::GetIter, dst, src));
    }

    /// For iteration: dst = next(iter), jump to label when exhausted.
    pub fn emit_for_iter(&mut self, dst: Register, label: Label) {
        self.emit_branch(Opcode::ForIter, dst, label);
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    fn fail(&mut self, error: BuildError) {
        self.error.get_or_insert(error);
    }

    /// Finish building and return the code object.
    pub fn finish(mut self) -> Result<CodeObject, BuildError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        // Finalize line table
        let final_pc = self.instructions.len() as u32;
        if final_pc > self.line_start_pc {
            self.line_table.push(LineTableEntry {
                start_pc: self.line_start_pc,
                end_pc: final_pc,
                line: self.current_line,
            });
        }

        // Patch forward references
        for fwd in &self.forward_refs {
            let Some(&target) = self.labels.get(&fwd.label) else {
                return Err(BuildError::UnboundLabel {
                    code: self.name.clone(),
                    label: fwd.label.0,
                });
            };
            let offset = (target as i32) - (fwd.instruction_index as i32) - 1;

            let old = self.instructions[fwd.instruction_index];
            if let Some(opcode) = old.decode() {
                // Encode offset as signed 16-bit
                self.instructions[fwd.instruction_index] =
                    Instruction::op_di(opcode, old.dst(), offset as i16 as u16);
            }
        }

        Ok(CodeObject {
            name: self.name,
            qualname: self.qualname,
            filename: self.filename,
            first_lineno: self.first_lineno,
            instructions: self.instructions.into_boxed_slice(),
            constants: self.constants.into_boxed_slice(),
            locals: self.locals.into_boxed_slice(),
            names: self.names.into_boxed_slice(),
            freevars: self.freevars.into_boxed_slice(),
            cellvars: self.cellvars.into_boxed_slice(),
            arg_count: self.arg_count,
            posonlyarg_count: self.posonlyarg_count,
            kwonlyarg_count: self.kwonlyarg_count,
            register_count: self.max_registers,
            flags: self.flags,
            line_table: self.line_table.into_boxed_slice(),
        })
    }
}
