//! Scope extraction.
//!
//! Walks a compiled callable and everything nested in its constant pool
//! (inner functions, comprehensions, generator expressions, class bodies) and
//! collects the names resolved from outside the callable's own frame.
//!
//! # Algorithm
//!
//! 1. **Classification**: tag every read as local, parameter, free, global or
//!    attribute (see [`classify`]).
//! 2. **Recording**: free reads not bound anywhere in the analyzed chain and
//!    all global reads become [`AccessRecord`]s; attribute reads immediately
//!    following a recorded read extend its attribute path.
//! 3. **Recursion**: nested code is analyzed with the names bound by every
//!    enclosing analyzed frame. Function frames bind their locals and cells;
//!    class bodies only their cells, since class-level names are invisible to
//!    nested scopes.
//!
//! Defaults, decorators and eager annotations of a nested function are
//! evaluated by the enclosing frame's instructions and are analyzed there.
//! Lazily evaluated annotation code is skipped.

mod access;
mod classify;

pub use access::{AccessKind, AccessRecord, AccessSet, AttributePath, SourceLocation};
pub use classify::{Classified, NameRef, classify};

use crate::error::ExtractError;
use localscope_bytecode::{CodeObject, Register};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::debug;

/// Deepest nesting of code objects accepted below the analyzed callable.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Names bound by the analyzed frames enclosing the code being visited.
type BoundNames = FxHashSet<Arc<str>>;

/// Extract the external reads of `code` and all code nested inside it.
pub fn extract(code: &CodeObject) -> Result<AccessSet, ExtractError> {
    let mut set = AccessSet::new();
    visit(code, BoundNames::default(), 0, &mut set)?;
    debug!(
        qualname = %code.qualname,
        globals = ?set.names(AccessKind::Global),
        free = ?set.names(AccessKind::Free),
        "extracted access set"
    );
    Ok(set)
}

fn visit(
    code: &CodeObject,
    bound: BoundNames,
    depth: usize,
    set: &mut AccessSet,
) -> Result<(), ExtractError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ExtractError::TooDeep {
            qualname: code.qualname.clone(),
            limit: MAX_NESTING_DEPTH,
        });
    }

    let reads = classify(code)?;
    let last_lineno = code.last_lineno();
    debug!(qualname = %code.qualname, depth, reads = reads.len(), "analyzing code object");

    // Register holding the value of the record being extended, and its index.
    let mut chain: Option<(Register, usize)> = None;
    let mut previous_pc: Option<usize> = None;

    for read in &reads {
        let follows = previous_pc.is_some_and(|pc| pc + 1 == read.pc);
        let active = chain.take().filter(|_| follows);
        previous_pc = Some(read.pc);

        let (name, kind) = match read.reference {
            NameRef::Free(name) if !bound.contains(name) => (name, AccessKind::Free),
            NameRef::Global(name) => (name, AccessKind::Global),
            NameRef::Attribute { obj, name } => {
                match active {
                    Some((reg, idx)) if reg == obj => {
                        set.extend_path(idx, name.clone());
                        chain = Some((read.dst, idx));
                    }
                    _ => {}
                }
                continue;
            }
            NameRef::Free(_) | NameRef::Local(_) | NameRef::Parameter(_) => continue,
        };

        let record = AccessRecord {
            name: name.clone(),
            kind,
            attribute_path: AttributePath::new(),
            location: SourceLocation {
                filename: code.filename.clone(),
                line: code.line_for_pc(read.pc as u32).unwrap_or(code.first_lineno),
                qualname: code.qualname.clone(),
                first_lineno: code.first_lineno,
                last_lineno,
                depth,
            },
        };
        if let Some(idx) = set.observe(record) {
            chain = Some((read.dst, idx));
        }
    }

    let mut inner = bound;
    if !code.is_class_body() && !code.is_module() {
        inner.extend(code.locals.iter().cloned());
    }
    inner.extend(code.cellvars.iter().cloned());

    for nested in code.nested_code() {
        if nested.is_annotation() {
            debug!(qualname = %nested.qualname, "skipping annotation code");
            continue;
        }
        visit(nested, inner.clone(), depth + 1, set)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use localscope_bytecode::{CodeFlags, FunctionBuilder};

    /// `def f(x): return x / sigma`
    fn divide_by_sigma() -> CodeObject {
        let mut builder = FunctionBuilder::new("f");
        builder.set_filename("model.py");
        builder.set_first_lineno(3);
        builder.set_arg_count(1);
        let x = builder.define_local("x");
        let sigma = builder.add_name("sigma");
        let r0 = builder.alloc_register();
        let r1 = builder.alloc_register();
        builder.set_line(4);
        builder.emit_load_local(r0, x);
        builder.emit_load_global(r1, sigma);
        builder.emit_div(r0, r0, r1);
        builder.emit_return(r0);
        builder.finish().unwrap()
    }

    #[test]
    fn test_global_read() {
        let set = extract(&divide_by_sigma()).unwrap();
        assert_eq!(set.len(), 1);
        let record = set.get("sigma", AccessKind::Global).unwrap();
        assert_eq!(record.location.line, 4);
        assert_eq!(&*record.location.qualname, "f");
        assert_eq!(record.location.depth, 0);
    }

    #[test]
    fn test_attribute_chain() {
        // np.linalg.norm(x)
        let mut builder = FunctionBuilder::new("f");
        builder.set_arg_count(1);
        let x = builder.define_local("x");
        let np = builder.add_name("np");
        let linalg = builder.add_name("linalg");
        let norm = builder.add_name("norm");
        let r0 = builder.alloc_register();
        let r1 = builder.alloc_register();
        builder.emit_load_global(r0, np);
        builder.emit_get_attr(r0, r0, linalg);
        builder.emit_load_method(r0, r0, norm);
        builder.emit_load_local(r1, x);
        builder.emit_call_method(r0, r0, 1);
        // An attribute read that does not follow the chain is not appended.
        builder.emit_get_attr(r0, r0, norm);
        builder.emit_return(r0);
        let code = builder.finish().unwrap();

        let set = extract(&code).unwrap();
        let record = set.get("np", AccessKind::Global).unwrap();
        assert_eq!(record.dotted(), "np.linalg.norm");
    }

    #[test]
    fn test_attribute_on_other_register_breaks_chain() {
        let mut builder = FunctionBuilder::new("f");
        builder.set_arg_count(1);
        let obj = builder.define_local("obj");
        let math = builder.add_name("math");
        let pi = builder.add_name("pi");
        let r0 = builder.alloc_register();
        let r1 = builder.alloc_register();
        builder.emit_load_local(r1, obj);
        builder.emit_load_global(r0, math);
        builder.emit_get_attr(r1, r1, pi);
        builder.emit_return(r1);
        let code = builder.finish().unwrap();

        let set = extract(&code).unwrap();
        assert!(set.get("math", AccessKind::Global).unwrap().attribute_path.is_empty());
    }

    #[test]
    fn test_annotation_code_is_skipped() {
        let mut outer = FunctionBuilder::new("f");
        let mut annotate = FunctionBuilder::nested(&outer, "__annotate__");
        annotate.add_flags(CodeFlags::ANNOTATION);
        let hint = annotate.add_name("Hint");
        let r0 = annotate.alloc_register();
        annotate.emit_load_global(r0, hint);
        annotate.emit_return(r0);
        outer.add_code_object(Arc::new(annotate.finish().unwrap()));
        outer.emit_return_none();

        assert!(extract(&outer.finish().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_nesting_limit() {
        let mut code = Arc::new(CodeObject::new("leaf", "deep.py"));
        for level in 0..=MAX_NESTING_DEPTH {
            let mut parent = CodeObject::new(format!("level{level}"), "deep.py");
            parent.constants = vec![localscope_bytecode::Constant::Code(code)].into_boxed_slice();
            code = Arc::new(parent);
        }
        assert!(matches!(
            extract(&code),
            Err(ExtractError::TooDeep { limit: MAX_NESTING_DEPTH, .. })
        ));
    }
}
