//! Builtin name registry.
//!
//! Provides the names every module can resolve without defining them:
//! constants, type objects and builtin functions.

use crate::value::{BuiltinType, Value};
use rustc_hash::FxHashMap;
use std::sync::{Arc, LazyLock};

/// Builtin functions that are not type objects.
const BUILTIN_FUNCTIONS: &[&str] = &[
    "__build_class__",
    "__import__",
    "abs",
    "aiter",
    "all",
    "anext",
    "any",
    "ascii",
    "bin",
    "breakpoint",
    "callable",
    "chr",
    "compile",
    "delattr",
    "dir",
    "divmod",
    "eval",
    "exec",
    "format",
    "getattr",
    "globals",
    "hasattr",
    "hash",
    "help",
    "hex",
    "id",
    "input",
    "isinstance",
    "issubclass",
    "iter",
    "len",
    "locals",
    "max",
    "min",
    "next",
    "oct",
    "open",
    "ord",
    "pow",
    "print",
    "repr",
    "round",
    "setattr",
    "sorted",
    "sum",
    "vars",
];

/// Builtin classes modelled as plain builtin functions (constructors).
const BUILTIN_CONSTRUCTORS: &[&str] = &[
    "bytearray",
    "bytes",
    "classmethod",
    "complex",
    "dict",
    "enumerate",
    "filter",
    "frozenset",
    "list",
    "map",
    "memoryview",
    "property",
    "range",
    "reversed",
    "set",
    "slice",
    "staticmethod",
    "super",
    "zip",
];

/// Exception classes resolvable as builtins.
const BUILTIN_EXCEPTIONS: &[&str] = &[
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "BaseException",
    "Exception",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "NotImplementedError",
    "OSError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

static STANDARD: LazyLock<Arc<BuiltinRegistry>> =
    LazyLock::new(|| Arc::new(BuiltinRegistry::with_standard_builtins()));

/// Registry of builtin functions and values.
#[derive(Debug, Default, Clone)]
pub struct BuiltinRegistry {
    /// Name to value mappings.
    entries: FxHashMap<Arc<str>, Value>,
}

impl BuiltinRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Shared registry with the standard builtins.
    pub fn standard() -> Arc<BuiltinRegistry> {
        STANDARD.clone()
    }

    /// Create registry with standard builtins.
    pub fn with_standard_builtins() -> Self {
        let mut registry = Self::new();

        // Constants
        registry.register("None", Value::None);
        registry.register("True", Value::Bool(true));
        registry.register("False", Value::Bool(false));
        registry.register("Ellipsis", Value::None);
        registry.register("NotImplemented", Value::None);
        registry.register("__debug__", Value::Bool(true));

        // Type objects
        for ty in [
            BuiltinType::Bool,
            BuiltinType::Int,
            BuiltinType::Float,
            BuiltinType::Str,
            BuiltinType::Tuple,
            BuiltinType::Type,
            BuiltinType::Object,
        ] {
            registry.register(ty.name(), Value::Type(ty));
        }

        for &name in BUILTIN_FUNCTIONS
            .iter()
            .chain(BUILTIN_CONSTRUCTORS)
            .chain(BUILTIN_EXCEPTIONS)
        {
            registry.register(name, Value::BuiltinFunction(name));
        }

        registry
    }

    /// Register a builtin name.
    #[inline]
    pub fn register(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.entries.insert(name.into(), value);
    }

    /// Get a builtin by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.get(name).cloned()
    }

    /// Check if a name is a builtin.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Get the number of registered builtins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
