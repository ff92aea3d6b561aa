use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::object::Class;
use crate::token::Token;
use crate::value::Value;

#[derive(Clone)]
pub struct Instance(Rc<RefCell<InstanceImpl>>);

pub struct InstanceImpl {
    class: Class,
    fields: HashMap<String, Value>,
}

impl Instance {
    pub fn new(class: Class) -> Self {
        Instance(Rc::new(RefCell::new(InstanceImpl {
            class,
            fields: HashMap::new(),
        })))
    }

    pub fn class(&self) -> Class {
        self.0.borrow().class.clone()
    }

    /// Reads a property: fields shadow methods, and a method comes back bound
    /// to this instance. Every read of a method makes a new bound method.
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.0.borrow().fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        match self.class().find_method(&name.lexeme) {
            Some(method) => Ok(Value::Function(method.bind(self.clone()))),
            None => Err(RuntimeError::new(
                name,
                format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }

    /// Fields are created on first write.
    pub fn set(&self, name: &Token, value: Value) {
        self.0
            .borrow_mut()
            .fields
            .insert(name.lexeme.clone(), value);
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.class().name)
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Instance")
            .field("class", &inner.class.name)
            .field("fields", &inner.fields.keys())
            .finish()
    }
}
