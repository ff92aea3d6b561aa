use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::Deref;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::object::{Callable, Function, Instance};
use crate::value::Value;

const INITIALIZER: &str = "init";

#[derive(Clone)]
pub struct Class(Rc<ClassImpl>);

pub struct ClassImpl {
    pub name: String,
    pub superclass: Option<Class>,
    pub methods: HashMap<String, Function>,
}

impl Class {
    pub fn new(
        name: impl Into<String>,
        superclass: Option<Class>,
        methods: HashMap<String, Function>,
    ) -> Self {
        Class(Rc::new(ClassImpl {
            name: name.into(),
            superclass,
            methods,
        }))
    }

    /// Looks `name` up in this class, then outward along the superclass
    /// chain. The nearest definition wins.
    pub fn find_method(&self, name: &str) -> Option<Function> {
        match self.methods.get(name) {
            Some(method) => Some(method.clone()),
            None => self.superclass.as_ref()?.find_method(name),
        }
    }

    pub fn ptr_eq(&self, other: &Class) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Callable for Class {
    fn arity(&self) -> usize {
        self.find_method(INITIALIZER)
            .map_or(0, |initializer| initializer.arity())
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let instance = Instance::new(self.clone());
        if let Some(initializer) = self.find_method(INITIALIZER) {
            initializer
                .bind(instance.clone())
                .call(interpreter, arguments)?;
        }
        Ok(Value::Instance(instance))
    }
}

impl Display for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Debug for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|class| &class.name))
            .field("methods", &self.methods.keys())
            .finish()
    }
}

impl Deref for Class {
    type Target = ClassImpl;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
