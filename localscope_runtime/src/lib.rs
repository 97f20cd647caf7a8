//! Live object model inspected by the localscope guard.
//!
//! The guard analyzes compiled code once, but permission checks run against
//! *live* bindings on every call. This crate provides those bindings:
//!
//! - [`Value`] - runtime values and their types
//! - [`GlobalScope`] - a module namespace, shared and rebindable
//! - [`Cell`] / [`ClosureEnv`] - captured variables of closures
//! - [`Function`] - compiled code plus its environment
//! - [`BuiltinRegistry`] - names resolvable without definition
//! - [`source`] - source text registry used for diagnostics

mod builtins;
mod exception;
mod function;
mod globals;
pub mod source;
mod value;

pub use builtins::BuiltinRegistry;
pub use exception::{Exception, ExceptionKind};
pub use function::{Cell, ClosureEnv, Function, NativeBody};
pub use globals::GlobalScope;
pub use value::{BuiltinType, Class, Instance, Module, TypeSpec, Value};
