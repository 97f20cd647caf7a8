//! Enforcement wrapper.
//!
//! [`wrap`] analyzes a callable once (through the extraction cache) and
//! returns a [`Guarded`] callable. Every call re-checks the extracted names
//! against the live globals and closure cells, then either refuses with a
//! [`ScopeViolation`] or forwards the call untouched.

use crate::cache::ExtractionCache;
use crate::config::ScopeConfig;
use crate::error::{CallError, ConfigError};
use crate::extract::{AccessKind, AccessRecord, AccessSet};
use crate::violation::{ScopeViolation, ViolationReason};
use localscope_bytecode::CodeObject;
use localscope_runtime::{ClosureEnv, Function, GlobalScope, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Names the runtime binds implicitly and that are never reported.
const RESERVED_NAMES: &[&str] = &["__class__"];

// =============================================================================
// Callable
// =============================================================================

/// Something with compiled code and a live environment that can be called.
pub trait Callable {
    fn code(&self) -> &Arc<CodeObject>;

    /// Module namespace the code resolves globals in.
    fn globals(&self) -> &Arc<GlobalScope>;

    /// Cells for the code's free variables, in `freevars` order.
    fn closure(&self) -> Option<&Arc<ClosureEnv>>;

    fn doc(&self) -> Option<&str>;

    fn call(&self, args: &[Value]) -> Result<Value, CallError>;

    fn name(&self) -> &str {
        &self.code().name
    }

    fn qualname(&self) -> &str {
        &self.code().qualname
    }

    fn parameters(&self) -> &[Arc<str>] {
        self.code().parameter_names()
    }
}

impl Callable for Function {
    fn code(&self) -> &Arc<CodeObject> {
        Function::code(self)
    }

    fn globals(&self) -> &Arc<GlobalScope> {
        Function::globals(self)
    }

    fn closure(&self) -> Option<&Arc<ClosureEnv>> {
        Function::closure(self)
    }

    fn doc(&self) -> Option<&str> {
        Function::doc(self)
    }

    fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        Function::call(self, args).map_err(CallError::Raised)
    }
}

impl<C: Callable + ?Sized> Callable for Arc<C> {
    fn code(&self) -> &Arc<CodeObject> {
        (**self).code()
    }

    fn globals(&self) -> &Arc<GlobalScope> {
        (**self).globals()
    }

    fn closure(&self) -> Option<&Arc<ClosureEnv>> {
        (**self).closure()
    }

    fn doc(&self) -> Option<&str> {
        (**self).doc()
    }

    fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        (**self).call(args)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn qualname(&self) -> &str {
        (**self).qualname()
    }

    fn parameters(&self) -> &[Arc<str>] {
        (**self).parameters()
    }
}

// =============================================================================
// Wrapping
// =============================================================================

/// Guard `callable` with `config`.
///
/// Fails with [`ConfigError::Extraction`] when the callable's code cannot be
/// analyzed.
#[instrument(level = "debug", skip_all, fields(qualname = %callable.qualname()))]
pub fn wrap<C: Callable>(callable: C, config: &ScopeConfig) -> Result<Guarded<C>, ConfigError> {
    wrap_with_cache(callable, config, ExtractionCache::global())
}

/// [`wrap`] using an explicit extraction cache.
pub fn wrap_with_cache<C: Callable>(
    callable: C,
    config: &ScopeConfig,
    cache: &ExtractionCache,
) -> Result<Guarded<C>, ConfigError> {
    let accesses = cache.get_or_extract(callable.code())?;
    debug!(
        qualname = callable.qualname(),
        records = accesses.len(),
        "guarding callable"
    );
    Ok(Guarded {
        inner: callable,
        config: Arc::new(config.clone()),
        accesses,
    })
}

/// Guard `callable` with the strict default configuration.
pub fn localscope<C: Callable>(callable: C) -> Result<Guarded<C>, ConfigError> {
    wrap(callable, &ScopeConfig::strict())
}

// =============================================================================
// Guarded
// =============================================================================

/// A callable whose external reads are checked before every call.
///
/// Introspection (name, parameters, doc) is forwarded to the wrapped
/// callable. Guards compose: wrapping a `Guarded` checks both configurations.
#[derive(Debug)]
pub struct Guarded<C> {
    inner: C,
    config: Arc<ScopeConfig>,
    accesses: Arc<AccessSet>,
}

impl<C: Callable> Guarded<C> {
    /// First refused read under the current bindings, if any.
    pub fn check(&self) -> Result<(), ScopeViolation> {
        for record in self.accesses.iter() {
            if let Some(reason) = self.refusal(record) {
                let violation = ScopeViolation::new(record, reason);
                debug!(
                    qualname = self.inner.qualname(),
                    name = %record.name,
                    kind = %record.kind,
                    ?reason,
                    "scope violation"
                );
                return Err(violation);
            }
        }
        debug!(qualname = self.inner.qualname(), "scope check passed");
        Ok(())
    }

    /// Every refused read under the current bindings.
    pub fn violations(&self) -> Vec<ScopeViolation> {
        self.accesses
            .iter()
            .filter_map(|record| {
                self.refusal(record)
                    .map(|reason| ScopeViolation::new(record, reason))
            })
            .collect()
    }

    fn refusal(&self, record: &AccessRecord) -> Option<ViolationReason> {
        let name = &*record.name;
        if self.inner.parameters().iter().any(|param| &**param == name)
            || self.config.allows(name)
            || RESERVED_NAMES.contains(&name)
            || self.inner.globals().builtins().contains(name)
        {
            return None;
        }
        if record.kind == AccessKind::Free && self.config.allow_closure() {
            return None;
        }
        match self.live_value(record) {
            None => Some(ViolationReason::Unbound),
            Some(value) if self.config.permits_value(&value) => None,
            Some(_) => Some(ViolationReason::NotPermitted),
        }
    }

    /// Snapshot of the value the record's name is bound to right now.
    fn live_value(&self, record: &AccessRecord) -> Option<Value> {
        match record.kind {
            AccessKind::Global => self.inner.globals().get(&record.name),
            AccessKind::Free => {
                let index = self
                    .inner
                    .code()
                    .freevars
                    .iter()
                    .position(|free| *free == record.name)?;
                self.inner.closure()?.get(index)
            }
        }
    }

    #[inline]
    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Names extracted from the wrapped callable.
    #[inline]
    pub fn accesses(&self) -> &AccessSet {
        &self.accesses
    }

    #[inline]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Callable> Callable for Guarded<C> {
    fn code(&self) -> &Arc<CodeObject> {
        self.inner.code()
    }

    fn globals(&self) -> &Arc<GlobalScope> {
        self.inner.globals()
    }

    fn closure(&self) -> Option<&Arc<ClosureEnv>> {
        self.inner.closure()
    }

    fn doc(&self) -> Option<&str> {
        self.inner.doc()
    }

    fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        self.check()?;
        self.inner.call(args)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn qualname(&self) -> &str {
        self.inner.qualname()
    }

    fn parameters(&self) -> &[Arc<str>] {
        self.inner.parameters()
    }
}
