//! Function and closure objects.
//!
//! A [`Function`] pairs a compiled [`CodeObject`] with the live environment it
//! resolves names against: the module's [`GlobalScope`] and the closure cells
//! captured from enclosing frames. Execution is delegated to a native body.

use crate::exception::Exception;
use crate::globals::GlobalScope;
use crate::value::Value;
use localscope_bytecode::{CodeFlags, CodeObject};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Cells
// =============================================================================

/// A closure cell. Shared between the frame that owns the variable and every
/// closure that captured it, so rebinding in either is visible to both.
#[derive(Default)]
pub struct Cell {
    value: RwLock<Option<Value>>,
}

impl Cell {
    pub fn new(value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(Some(value.into())),
        })
    }

    /// A cell whose variable has not been assigned yet.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the cell contents.
    #[inline]
    pub fn get(&self) -> Option<Value> {
        self.value.read().clone()
    }

    #[inline]
    pub fn set(&self, value: impl Into<Value>) {
        *self.value.write() = Some(value.into());
    }

    #[inline]
    pub fn clear(&self) {
        *self.value.write() = None;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value.read().is_none()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => write!(f, "<cell: {value}>"),
            None => f.write_str("<cell: empty>"),
        }
    }
}

// =============================================================================
// Closure Environment
// =============================================================================

/// Captured variable environment for closures.
///
/// Holds one cell per entry of the code object's `freevars`, in the same order.
#[derive(Debug, Clone, Default)]
pub struct ClosureEnv {
    cells: Box<[Arc<Cell>]>,
}

impl ClosureEnv {
    /// Create a closure environment from existing cells.
    pub fn new(cells: Vec<Arc<Cell>>) -> Self {
        Self {
            cells: cells.into_boxed_slice(),
        }
    }

    /// Create an environment with a fresh cell per value.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::new(values.into_iter().map(Cell::new).collect())
    }

    /// Get a captured value by index. `None` for a missing or empty cell.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.cells.get(index)?.get()
    }

    /// Get the cell at `index`.
    #[inline]
    pub fn cell(&self, index: usize) -> Option<&Arc<Cell>> {
        self.cells.get(index)
    }

    /// Get the number of captured cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// =============================================================================
// Function Object
// =============================================================================

/// Native implementation of a function body.
pub type NativeBody = Arc<dyn Fn(&Function, &[Value]) -> Result<Value, Exception> + Send + Sync>;

/// A function object: compiled code plus the namespaces it closes over.
///
/// Clones share code, namespaces and body.
#[derive(Clone)]
pub struct Function {
    /// Compiled bytecode.
    code: Arc<CodeObject>,
    /// Module globals.
    globals: Arc<GlobalScope>,
    /// Closure environment (captured variables).
    closure: Option<Arc<ClosureEnv>>,
    /// Docstring.
    doc: Option<Arc<str>>,
    body: NativeBody,
}

impl Function {
    /// Create a function without closure or docstring.
    pub fn new<F>(code: Arc<CodeObject>, globals: Arc<GlobalScope>, body: F) -> Self
    where
        F: Fn(&Function, &[Value]) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        Self {
            code,
            globals,
            closure: None,
            doc: None,
            body: Arc::new(body),
        }
    }

    /// Attach a closure environment.
    pub fn with_closure(mut self, closure: ClosureEnv) -> Self {
        self.closure = Some(Arc::new(closure));
        self
    }

    /// Attach a shared closure environment.
    pub fn with_shared_closure(mut self, closure: Arc<ClosureEnv>) -> Self {
        self.closure = Some(closure);
        self
    }

    /// Attach a docstring.
    pub fn with_doc(mut self, doc: impl Into<Arc<str>>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    #[inline]
    pub fn code(&self) -> &Arc<CodeObject> {
        &self.code
    }

    #[inline]
    pub fn globals(&self) -> &Arc<GlobalScope> {
        &self.globals
    }

    /// Get the closure environment.
    #[inline]
    pub fn closure(&self) -> Option<&Arc<ClosureEnv>> {
        self.closure.as_ref()
    }

    #[inline]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.code.name
    }

    #[inline]
    pub fn qualname(&self) -> &str {
        &self.code.qualname
    }

    /// Parameter names in declaration order.
    #[inline]
    pub fn parameters(&self) -> &[Arc<str>] {
        self.code.parameter_names()
    }

    /// Check if function takes *args.
    #[inline]
    pub fn has_varargs(&self) -> bool {
        self.code.flags.contains(CodeFlags::VARARGS)
    }

    /// Read a free variable by name from the closure.
    pub fn free_var(&self, name: &str) -> Option<Value> {
        let index = self.code.freevars.iter().position(|free| &**free == name)?;
        self.closure.as_ref()?.get(index)
    }

    /// Read a global, falling back to builtins.
    pub fn global(&self, name: &str) -> Result<Value, Exception> {
        self.globals
            .resolve(name)
            .ok_or_else(|| Exception::name_error(name))
    }

    /// Call with positional arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let expected = self.code.arg_count as usize;
        let accepted = if self.has_varargs() {
            args.len() >= expected
        } else {
            args.len() == expected
        };
        if !accepted {
            let plural = if expected == 1 { "" } else { "s" };
            return Err(Exception::type_error(format!(
                "{}() takes {expected} positional argument{plural} but {} were given",
                self.name(),
                args.len()
            )));
        }
        (self.body)(self, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("qualname", &self.qualname())
            .field("closure", &self.closure)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_code() -> Arc<CodeObject> {
        let mut code = CodeObject::new("test", "test.py");
        code.arg_count = 2;
        code.locals = vec!["a".into(), "b".into()].into_boxed_slice();
        code.freevars = vec!["offset".into()].into_boxed_slice();
        code.register_count = 4;
        Arc::new(code)
    }

    fn add(func: &Function, args: &[Value]) -> Result<Value, Exception> {
        let offset = func
            .free_var("offset")
            .and_then(|v| v.as_int())
            .unwrap_or(0);
        match (args[0].as_int(), args[1].as_int()) {
            (Some(a), Some(b)) => Ok(Value::Int(a + b + offset)),
            _ => Err(Exception::type_error("unsupported operand")),
        }
    }

    #[test]
    fn test_function_creation() {
        let func = Function::new(make_test_code(), Arc::new(GlobalScope::new()), add)
            .with_doc("Adds.");
        assert_eq!(func.name(), "test");
        assert_eq!(func.doc(), Some("Adds."));
        assert_eq!(func.parameters().len(), 2);
    }

    #[test]
    fn test_call_checks_arity() {
        let func = Function::new(make_test_code(), Arc::new(GlobalScope::new()), add);
        assert_eq!(func.call(&[Value::Int(1), Value::Int(2)]), Ok(Value::Int(3)));
        let err = func.call(&[Value::Int(1)]).unwrap_err();
        assert_eq!(
            err.message.as_ref(),
            "test() takes 2 positional arguments but 1 were given"
        );
    }

    #[test]
    fn test_closure_env() {
        let env = ClosureEnv::from_values([Value::Int(42), Value::Int(100)]);
        assert_eq!(env.len(), 2);
        assert_eq!(env.get(0).and_then(|v| v.as_int()), Some(42));
        assert_eq!(env.get(1).and_then(|v| v.as_int()), Some(100));
        assert!(env.get(2).is_none());
    }

    #[test]
    fn test_shared_cell_rebinding() {
        let cell = Cell::new(1);
        let func = Function::new(make_test_code(), Arc::new(GlobalScope::new()), add)
            .with_closure(ClosureEnv::new(vec![cell.clone()]));
        assert_eq!(func.call(&[Value::Int(1), Value::Int(1)]), Ok(Value::Int(3)));

        cell.set(10);
        assert_eq!(func.call(&[Value::Int(1), Value::Int(1)]), Ok(Value::Int(12)));

        cell.clear();
        assert!(cell.is_empty());
        assert!(func.free_var("offset").is_none());
    }
}
