//! Runtime values and their types.
//!
//! Only what the scope guard needs to observe is modelled: the guard looks at
//! a binding's *type* (for `allow_types` and value predicates), never at its
//! contents.

use crate::function::Function;
use crate::globals::GlobalScope;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Builtin Types
// =============================================================================

/// Types provided by the runtime itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Tuple,
    /// The type of classes and type objects.
    Type,
    Module,
    /// User-defined functions.
    Function,
    /// Functions implemented by the runtime (`len`, `print`, ...).
    BuiltinFunction,
    /// Root of the class hierarchy; every value is an instance.
    Object,
}

impl BuiltinType {
    /// Name as spelled in source code.
    pub const fn name(self) -> &'static str {
        match self {
            BuiltinType::NoneType => "NoneType",
            BuiltinType::Bool => "bool",
            BuiltinType::Int => "int",
            BuiltinType::Float => "float",
            BuiltinType::Str => "str",
            BuiltinType::Tuple => "tuple",
            BuiltinType::Type => "type",
            BuiltinType::Module => "module",
            BuiltinType::Function => "function",
            BuiltinType::BuiltinFunction => "builtin_function_or_method",
            BuiltinType::Object => "object",
        }
    }

    /// Direct base type (`bool` derives from `int`).
    pub const fn base(self) -> Option<BuiltinType> {
        match self {
            BuiltinType::Object => None,
            BuiltinType::Bool => Some(BuiltinType::Int),
            _ => Some(BuiltinType::Object),
        }
    }

    /// Subtype check along the builtin hierarchy.
    pub fn is_subtype_of(self, other: BuiltinType) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty == other {
                return true;
            }
            current = ty.base();
        }
        false
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Classes, Instances, Modules
// =============================================================================

/// A user-defined class.
#[derive(Debug)]
pub struct Class {
    pub name: Arc<str>,
    pub bases: Vec<Arc<Class>>,
}

impl Class {
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            bases: Vec::new(),
        })
    }

    pub fn with_bases(name: impl Into<Arc<str>>, bases: Vec<Arc<Class>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            bases,
        })
    }

    /// True if `self` is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        std::ptr::eq(self, other) || self.bases.iter().any(|base| base.is_subclass_of(other))
    }
}

/// An instance of a user-defined class.
#[derive(Debug)]
pub struct Instance {
    pub class: Arc<Class>,
}

/// A module: a name plus its global namespace.
#[derive(Debug)]
pub struct Module {
    pub name: Arc<str>,
    pub globals: Arc<GlobalScope>,
}

impl Module {
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            globals: Arc::new(GlobalScope::new()),
        })
    }
}

// =============================================================================
// Type Specification
// =============================================================================

/// A type a binding can be checked against (`isinstance` semantics).
#[derive(Debug, Clone)]
pub enum TypeSpec {
    Builtin(BuiltinType),
    Class(Arc<Class>),
}

impl TypeSpec {
    /// True if `value` is an instance of this type or one of its subtypes.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            TypeSpec::Builtin(BuiltinType::Object) => true,
            TypeSpec::Builtin(expected) => value.builtin_type().is_some_and(|ty| ty.is_subtype_of(*expected)),
            TypeSpec::Class(class) => match value {
                Value::Instance(instance) => instance.class.is_subclass_of(class),
                _ => false,
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TypeSpec::Builtin(ty) => ty.name(),
            TypeSpec::Class(class) => &class.name,
        }
    }
}

impl PartialEq for TypeSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeSpec::Builtin(a), TypeSpec::Builtin(b)) => a == b,
            (TypeSpec::Class(a), TypeSpec::Class(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<BuiltinType> for TypeSpec {
    fn from(ty: BuiltinType) -> Self {
        TypeSpec::Builtin(ty)
    }
}

impl From<Arc<Class>> for TypeSpec {
    fn from(class: Arc<Class>) -> Self {
        TypeSpec::Class(class)
    }
}

// =============================================================================
// Value
// =============================================================================

/// A runtime value. Heap objects are shared by `Arc` and compared by identity.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tuple(Arc<[Value]>),
    /// A builtin type object such as `int`.
    Type(BuiltinType),
    Class(Arc<Class>),
    Instance(Arc<Instance>),
    Module(Arc<Module>),
    Function(Arc<Function>),
    BuiltinFunction(&'static str),
}

impl Value {
    #[inline]
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Builtin type of the value, `None` for instances of user classes.
    pub fn builtin_type(&self) -> Option<BuiltinType> {
        Some(match self {
            Value::None => BuiltinType::NoneType,
            Value::Bool(_) => BuiltinType::Bool,
            Value::Int(_) => BuiltinType::Int,
            Value::Float(_) => BuiltinType::Float,
            Value::Str(_) => BuiltinType::Str,
            Value::Tuple(_) => BuiltinType::Tuple,
            Value::Type(_) | Value::Class(_) => BuiltinType::Type,
            Value::Module(_) => BuiltinType::Module,
            Value::Function(_) => BuiltinType::Function,
            Value::BuiltinFunction(_) => BuiltinType::BuiltinFunction,
            Value::Instance(_) => return None,
        })
    }

    /// Name of the value's type, as `type(value).__name__` would report it.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Instance(instance) => &instance.class.name,
            other => other.builtin_type().map_or("object", BuiltinType::name),
        }
    }

    /// Interpret the value as a type, if it is one.
    pub fn as_type(&self) -> Option<TypeSpec> {
        match self {
            Value::Type(ty) => Some(TypeSpec::Builtin(*ty)),
            Value::Class(class) => Some(TypeSpec::Class(class.clone())),
            _ => None,
        }
    }

    #[inline]
    pub fn is_module(&self) -> bool {
        matches!(self, Value::Module(_))
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    #[inline]
    pub fn is_class(&self) -> bool {
        matches!(self, Value::Class(_) | Value::Type(_))
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Numeric value as a float (ints are widened).
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::BuiltinFunction(a), Value::BuiltinFunction(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Tuple(items) => {
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
            Value::Type(ty) => write!(f, "<class '{ty}'>"),
            Value::Class(class) => write!(f, "<class '{}'>", class.name),
            Value::Instance(instance) => write!(f, "<{} object>", instance.class.name),
            Value::Module(module) => write!(f, "<module '{}'>", module.name),
            Value::Function(func) => write!(f, "<function {}>", func.qualname()),
            Value::BuiltinFunction(name) => write!(f, "<built-in function {name}>"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<Arc<Function>> for Value {
    fn from(func: Arc<Function>) -> Self {
        Value::Function(func)
    }
}
