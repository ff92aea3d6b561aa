use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::value::Value;

/// Anything that can appear before `(...)`: native functions, closures and
/// classes. Callers check the argument count against `arity` before calling.
pub trait Callable {
    fn arity(&self) -> usize;

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError>;
}
