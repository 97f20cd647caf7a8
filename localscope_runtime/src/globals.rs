//! Global scope management with fast hash map lookup.
//!
//! The global scope contains module-level names. It is shared between every
//! function defined in the module and may be rebound at any time (the whole
//! point of re-checking on each call), so bindings sit behind a
//! `parking_lot::RwLock` and lookups return owned snapshots.

use crate::builtins::BuiltinRegistry;
use crate::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Global scope containing module-level bindings.
pub struct GlobalScope {
    /// Name to value bindings.
    bindings: RwLock<FxHashMap<Arc<str>, Value>>,
    /// Builtins visible from this module (`__builtins__`).
    builtins: Arc<BuiltinRegistry>,
}

impl GlobalScope {
    /// Create a new empty global scope with the standard builtins.
    #[inline]
    pub fn new() -> Self {
        Self::with_builtins(BuiltinRegistry::standard())
    }

    /// Create with pre-allocated capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bindings: RwLock::new(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
            builtins: BuiltinRegistry::standard(),
        }
    }

    /// Create a scope resolving builtins from a custom registry.
    pub fn with_builtins(builtins: Arc<BuiltinRegistry>) -> Self {
        Self {
            bindings: RwLock::new(FxHashMap::default()),
            builtins,
        }
    }

    /// Snapshot of the value currently bound to `name`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.bindings.read().get(name).cloned()
    }

    /// Bind a value, returning the previous binding.
    #[inline]
    pub fn set(&self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Option<Value> {
        self.bindings.write().insert(name.into(), value.into())
    }

    /// Delete a name, returning the old value if present.
    #[inline]
    pub fn delete(&self, name: &str) -> Option<Value> {
        self.bindings.write().remove(name)
    }

    /// Check if a name exists.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
    }

    /// Get the number of bindings.
    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Sorted names currently bound.
    pub fn names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<_> = self.bindings.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Builtins consulted after the module namespace.
    #[inline]
    pub fn builtins(&self) -> &Arc<BuiltinRegistry> {
        &self.builtins
    }

    /// Full lookup: module bindings first, then builtins.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).or_else(|| self.builtins.get(name))
    }
}

impl Default for GlobalScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for GlobalScope {
    fn clone(&self) -> Self {
        Self {
            bindings: RwLock::new(self.bindings.read().clone()),
            builtins: self.builtins.clone(),
        }
    }
}

impl fmt::Debug for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalScope")
            .field("names", &self.names())
            .finish_non_exhaustive()
    }
}
