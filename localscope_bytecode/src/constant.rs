//! Constant pool entries.

use super::code_object::CodeObject;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A constant referenced by `LoadConst`, `MakeFunction` or `MakeClosure`.
///
/// Nested functions, comprehensions, generator expressions and class bodies
/// live in the constant pool as [`Constant::Code`].
#[derive(Debug, Clone)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tuple(Arc<[Constant]>),
    Code(Arc<CodeObject>),
}

impl Constant {
    /// The nested code object, if this constant is one.
    #[inline]
    pub fn as_code(&self) -> Option<&Arc<CodeObject>> {
        match self {
            Constant::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Short description used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::None => "None",
            Constant::Bool(_) => "bool",
            Constant::Int(_) => "int",
            Constant::Float(_) => "float",
            Constant::Str(_) => "str",
            Constant::Tuple(_) => "tuple",
            Constant::Code(_) => "code",
        }
    }
}

// Floats compare by bit pattern so that the pool (and the fingerprint built
// from it) is a total, reflexive relation.
impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::None, Constant::None) => true,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) => a == b,
            (Constant::Tuple(a), Constant::Tuple(b)) => a == b,
            (Constant::Code(a), Constant::Code(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::None => {}
            Constant::Bool(b) => b.hash(state),
            Constant::Int(i) => i.hash(state),
            Constant::Float(f) => f.to_bits().hash(state),
            Constant::Str(s) => s.hash(state),
            Constant::Tuple(items) => items.hash(state),
            Constant::Code(code) => code.hash(state),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => f.write_str("None"),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Str(s) => write!(f, "{s:?}"),
            Constant::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Constant::Code(code) => write!(
                f,
                "<code object {} at file \"{}\", line {}>",
                code.name, code.filename, code.first_lineno
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_eq!(Constant::Float(f64::NAN), Constant::Float(f64::NAN));
        assert_ne!(Constant::Float(0.0), Constant::Float(-0.0));
    }

    #[test]
    fn test_display() {
        let tuple = Constant::Tuple(Arc::from(vec![Constant::Int(1)]));
        assert_eq!(tuple.to_string(), "(1,)");
        assert_eq!(Constant::Str("a".into()).to_string(), "\"a\"");
        assert_eq!(Constant::Bool(true).to_string(), "True");
    }

    #[test]
    fn test_as_code() {
        let code = Arc::new(CodeObject::new("inner", "t.py"));
        assert!(Constant::Code(code).as_code().is_some());
        assert!(Constant::Int(3).as_code().is_none());
    }
}
