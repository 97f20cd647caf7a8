//! Packed instruction encoding.
//!
//! Every instruction is a single 32-bit word:
//!
//! ```text
//! [ opcode:8 | a:8 | b:8 | c:8 ]      three register/byte operands
//! [ opcode:8 | a:8 | imm16:16 ]       register + 16-bit immediate
//! ```
//!
//! The meaning of `a`, `b` and `c` depends on the opcode's
//! [`InstructionFormat`]. Name-referencing opcodes carry an index into one of
//! the code object's name tables, which is how analysis recovers the binding
//! source of every read without looking at source text.

use std::fmt;

/// A virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(pub u8);

impl Register {
    /// Create a register from its index.
    #[inline]
    pub const fn new(index: u8) -> Self {
        Register(index)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Index of a local variable slot (parameters occupy the first slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalSlot(pub u16);

impl LocalSlot {
    #[inline]
    pub const fn new(index: u16) -> Self {
        LocalSlot(index)
    }
}

/// Index into the constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstIndex(pub u16);

impl ConstIndex {
    #[inline]
    pub const fn new(index: u16) -> Self {
        ConstIndex(index)
    }
}

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionFormat {
    /// No operands.
    Op,
    /// One register.
    D,
    /// Destination and source register.
    DS,
    /// Destination and two source registers (or register, register, count).
    DSS,
    /// Register and 16-bit immediate (slot, name index, constant or jump offset).
    DI,
    /// Destination, object register and 8-bit name index.
    DSN,
}

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $value:literal => $format:ident,)*) => {
        /// Bytecode operations.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $name = $value,)*
        }

        impl Opcode {
            /// Decode an opcode byte.
            pub const fn from_u8(byte: u8) -> Option<Opcode> {
                match byte {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Operand layout used by this opcode.
            pub const fn format(self) -> InstructionFormat {
                match self {
                    $(Opcode::$name => InstructionFormat::$format,)*
                }
            }

            /// Mnemonic used by the disassembler.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name),)*
                }
            }
        }
    };
}

opcodes! {
    /// No operation.
    Nop = 0 => Op,
    /// dst = constants[imm16]
    LoadConst = 1 => DI,
    /// dst = None
    LoadNone = 2 => D,
    /// dst = True
    LoadTrue = 3 => D,
    /// dst = False
    LoadFalse = 4 => D,
    /// dst = src
    Move = 5 => DS,

    // --- Name access ---
    /// dst = locals[imm16]
    LoadLocal = 10 => DI,
    /// locals[imm16] = src
    StoreLocal = 11 => DI,
    /// del locals[imm16]
    DeleteLocal = 12 => DI,
    /// dst = closure[imm16] (cells first, then free variables)
    LoadClosure = 13 => DI,
    /// closure[imm16] = src
    StoreClosure = 14 => DI,
    /// del closure[imm16]
    DeleteClosure = 15 => DI,
    /// dst = globals[names[imm16]] (falling back to builtins)
    LoadGlobal = 16 => DI,
    /// globals[names[imm16]] = src
    StoreGlobal = 17 => DI,
    /// del globals[names[imm16]]
    DeleteGlobal = 18 => DI,
    /// dst = frame-local, then global, then builtin lookup of names[imm16]
    LoadName = 19 => DI,
    /// frame-local names[imm16] = src
    StoreName = 20 => DI,
    /// del frame-local names[imm16]
    DeleteName = 21 => DI,

    // --- Attributes and items ---
    /// dst = obj.names[c]
    GetAttr = 30 => DSN,
    /// obj.names[c] = src
    SetAttr = 31 => DSN,
    /// del obj.names[c]
    DelAttr = 32 => DSN,
    /// dst = obj.names[c] (bound for an immediate call)
    LoadMethod = 33 => DSN,
    /// dst = obj[key]
    GetItem = 34 => DSS,
    /// obj[key] = value
    SetItem = 35 => DSS,

    // --- Arithmetic and comparison ---
    Add = 40 => DSS,
    Sub = 41 => DSS,
    Mul = 42 => DSS,
    TrueDiv = 43 => DSS,
    FloorDiv = 44 => DSS,
    Mod = 45 => DSS,
    Pow = 46 => DSS,
    Neg = 47 => DS,
    Not = 48 => DS,
    Lt = 50 => DSS,
    Le = 51 => DSS,
    Eq = 52 => DSS,
    Ne = 53 => DSS,
    Gt = 54 => DSS,
    Ge = 55 => DSS,

    // --- Control flow ---
    /// Relative jump by signed imm16.
    Jump = 60 => DI,
    JumpIfFalse = 61 => DI,
    JumpIfTrue = 62 => DI,
    /// dst = func(args in dst+1..), argc in c
    Call = 63 => DSS,
    /// dst = method(args in dst+1..), argc in c
    CallMethod = 64 => DSS,
    Return = 65 => D,
    ReturnNone = 66 => Op,
    Raise = 67 => D,
    Yield = 68 => D,

    // --- Containers and iteration ---
    BuildList = 70 => DSS,
    BuildTuple = 71 => DSS,
    BuildSet = 72 => DSS,
    BuildDict = 73 => DSS,
    ListAppend = 74 => DSS,
    SetAdd = 75 => DSS,
    DictSet = 76 => DSS,
    GetIter = 77 => DS,
    /// dst = next(iter in dst), jump by imm16 when exhausted
    ForIter = 78 => DI,

    // --- Functions and imports ---
    /// dst = function(constants[imm16])
    MakeFunction = 80 => DI,
    /// dst = closure(constants[imm16]) capturing the current frame's cells
    MakeClosure = 81 => DI,
    /// dst = import(names[imm16])
    ImportName = 82 => DI,
}

/// A 32-bit packed instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u32);

impl Instruction {
    /// Pack an opcode with three byte operands.
    #[inline]
    pub const fn new(opcode: Opcode, a: u8, b: u8, c: u8) -> Self {
        Instruction(((opcode as u32) << 24) | ((a as u32) << 16) | ((b as u32) << 8) | c as u32)
    }

    /// Reconstruct an instruction from its raw word.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Instruction(raw)
    }

    /// Opcode-only instruction.
    #[inline]
    pub const fn op(opcode: Opcode) -> Self {
        Self::new(opcode, 0, 0, 0)
    }

    /// Instruction with a single register.
    #[inline]
    pub const fn op_d(opcode: Opcode, dst: Register) -> Self {
        Self::new(opcode, dst.0, 0, 0)
    }

    /// Instruction with destination and source.
    #[inline]
    pub const fn op_ds(opcode: Opcode, dst: Register, src: Register) -> Self {
        Self::new(opcode, dst.0, src.0, 0)
    }

    /// Instruction with destination and two sources.
    #[inline]
    pub const fn op_dss(opcode: Opcode, dst: Register, src1: Register, src2: Register) -> Self {
        Self::new(opcode, dst.0, src1.0, src2.0)
    }

    /// Instruction with a register and 16-bit immediate.
    #[inline]
    pub const fn op_di(opcode: Opcode, dst: Register, imm: u16) -> Self {
        Self::new(opcode, dst.0, (imm >> 8) as u8, imm as u8)
    }

    /// Instruction with destination, object register and 8-bit name index.
    #[inline]
    pub const fn op_dsn(opcode: Opcode, dst: Register, obj: Register, name: u8) -> Self {
        Self::new(opcode, dst.0, obj.0, name)
    }

    /// Raw opcode byte. May not decode if the word was not produced by this crate.
    #[inline]
    pub const fn opcode(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Decoded opcode.
    #[inline]
    pub const fn decode(self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode())
    }

    #[inline]
    pub const fn dst(self) -> Register {
        Register((self.0 >> 16) as u8)
    }

    #[inline]
    pub const fn src1(self) -> Register {
        Register((self.0 >> 8) as u8)
    }

    #[inline]
    pub const fn src2(self) -> Register {
        Register(self.0 as u8)
    }

    /// Low 16 bits (for `DI` instructions).
    #[inline]
    pub const fn imm16(self) -> u16 {
        self.0 as u16
    }

    /// Low 8 bits (name index for `DSN` instructions).
    #[inline]
    pub const fn name8(self) -> u8 {
        self.0 as u8
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction({:#010x}: {})", self.0, self)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(opcode) = self.decode() else {
            return write!(f, "<invalid {:#04x}>", self.opcode());
        };
        let name = opcode.name();
        match opcode.format() {
            InstructionFormat::Op => write!(f, "{name}"),
            InstructionFormat::D => write!(f, "{name} {}", self.dst()),
            InstructionFormat::DS => write!(f, "{name} {}, {}", self.dst(), self.src1()),
            InstructionFormat::DSS => write!(
                f,
                "{name} {}, {}, {}",
                self.dst(),
                self.src1(),
                self.src2()
            ),
            InstructionFormat::DI => write!(f, "{name} {}, #{}", self.dst(), self.imm16()),
            InstructionFormat::DSN => write!(
                f,
                "{name} {}, {}, @{}",
                self.dst(),
                self.src1(),
                self.name8()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing_dss() {
        let inst = Instruction::op_dss(Opcode::Add, Register(1), Register(2), Register(3));
        assert_eq!(inst.decode(), Some(Opcode::Add));
        assert_eq!(inst.dst(), Register(1));
        assert_eq!(inst.src1(), Register(2));
        assert_eq!(inst.src2(), Register(3));
    }

    #[test]
    fn test_packing_di() {
        let inst = Instruction::op_di(Opcode::LoadGlobal, Register(7), 0x1234);
        assert_eq!(inst.decode(), Some(Opcode::LoadGlobal));
        assert_eq!(inst.dst(), Register(7));
        assert_eq!(inst.imm16(), 0x1234);
    }

    #[test]
    fn test_unknown_opcode_byte() {
        assert_eq!(Opcode::from_u8(0xff), None);
        let inst = Instruction::from_raw(0xff00_0000);
        assert!(inst.decode().is_none());
        assert_eq!(inst.to_string(), "<invalid 0xff>");
    }

    #[test]
    fn test_display() {
        let inst = Instruction::op_dsn(Opcode::GetAttr, Register(1), Register(0), 4);
        assert_eq!(inst.to_string(), "GetAttr r1, r0, @4");
        let inst = Instruction::op_di(Opcode::LoadClosure, Register(2), 1);
        assert_eq!(inst.to_string(), "LoadClosure r2, #1");
    }

    #[test]
    fn test_formats() {
        assert_eq!(Opcode::LoadGlobal.format(), InstructionFormat::DI);
        assert_eq!(Opcode::LoadMethod.format(), InstructionFormat::DSN);
        assert_eq!(Opcode::ReturnNone.format(), InstructionFormat::Op);
    }
}
