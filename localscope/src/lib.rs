//! Guard against unintended scope leakage.
//!
//! A function that silently reads a global (or a variable captured from an
//! enclosing function) instead of a parameter keeps working while the global
//! happens to hold the right value, and breaks when it is rebound. This crate
//! catches such reads:
//!
//! 1. [`extract`] walks the compiled code of a callable, and of everything
//!    nested in it, and collects the names it resolves from outside its own
//!    frame.
//! 2. [`wrap`] returns a [`Guarded`] callable that, on every call, checks those
//!    names against the live bindings and a [`ScopeConfig`], refusing the call
//!    with a [`ScopeViolation`] when a name is not permitted.
//!
//! ```
//! use std::sync::Arc;
//! use localscope::{Callable, CallError, localscope};
//! use localscope_bytecode::FunctionBuilder;
//! use localscope_runtime::{Function, GlobalScope, Value};
//!
//! // def f(x): return x / sigma
//! let mut builder = FunctionBuilder::new("f");
//! builder.set_arg_count(1);
//! let x = builder.define_local("x");
//! let sigma = builder.add_name("sigma");
//! let (r0, r1) = (builder.alloc_register(), builder.alloc_register());
//! builder.emit_load_local(r0, x);
//! builder.emit_load_global(r1, sigma);
//! builder.emit_div(r0, r0, r1);
//! builder.emit_return(r0);
//! let code = Arc::new(builder.finish().unwrap());
//!
//! let globals = Arc::new(GlobalScope::new());
//! globals.set("sigma", 7);
//! let f = Function::new(code, globals, |func, args| {
//!     let sigma = func.global("sigma")?;
//!     Ok(Value::Float(args[0].as_float().unwrap_or(0.0) / sigma.as_float().unwrap_or(1.0)))
//! });
//!
//! let f = localscope(f).unwrap();
//! let err = f.call(&[Value::Int(1)]).unwrap_err();
//! assert!(matches!(&err, CallError::Scope(v) if v.name() == "sigma"));
//! ```

pub mod cache;
mod config;
mod error;
pub mod extract;
mod guard;
mod violation;

pub use cache::ExtractionCache;
pub use config::{ScopeConfig, ScopeConfigBuilder, ValuePredicate};
pub use error::{CallError, ConfigError, ExtractError};
pub use extract::{
    AccessKind, AccessRecord, AccessSet, AttributePath, MAX_NESTING_DEPTH, SourceLocation,
    extract,
};
pub use guard::{Callable, Guarded, localscope, wrap, wrap_with_cache};
pub use violation::{ScopeViolation, ViolationReason};
