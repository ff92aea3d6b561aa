use std::fmt::{self, Debug, Display, Formatter};
use std::ops::Deref;
use std::rc::Rc;

use crate::env::{EnvRef, Environment};
use crate::error::RuntimeError;
use crate::interpreter::{Flow, Interpreter};
use crate::object::{Callable, Instance};
use crate::stmt::FunctionDecl;
use crate::value::Value;

/// A closure: a declaration plus the scope it was declared in.
#[derive(Clone)]
pub struct Function(Rc<FunctionImpl>);

pub struct FunctionImpl {
    pub declaration: Rc<FunctionDecl>,
    pub closure: EnvRef,
    pub is_initializer: bool,
}

impl Function {
    pub fn new(declaration: Rc<FunctionDecl>, closure: EnvRef, is_initializer: bool) -> Self {
        Function(Rc::new(FunctionImpl {
            declaration,
            closure,
            is_initializer,
        }))
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    /// Returns a copy of this method whose closure has one extra scope
    /// binding `this` to `instance`.
    pub fn bind(&self, instance: Instance) -> Function {
        let env = Environment::enclose(&self.closure);
        env.borrow_mut().define("this", Value::Instance(instance));
        Function::new(Rc::clone(&self.declaration), env, self.is_initializer)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn this(&self) -> Value {
        Environment::get_at(&self.closure, 0, "this")
            .unwrap_or_else(|| unreachable!("initializer {:?} is not bound", self.name()))
    }
}

impl Callable for Function {
    fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        // construct a new environment for the lifetime of the call where the
        // parameters have been assigned the values of the arguments
        let env = Environment::enclose(&self.closure);
        for (param, arg) in self.declaration.params.iter().zip(arguments) {
            env.borrow_mut().define(param.lexeme.clone(), arg);
        }

        let flow = interpreter.execute_block(&self.declaration.body, env)?;

        if self.is_initializer {
            return Ok(self.this());
        }
        match flow {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Nil),
        }
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}

impl Deref for Function {
    type Target = FunctionImpl;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
