use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// Shared handle to a scope. A scope stays alive while the call stack or any
/// closure that captured it still holds one of these.
pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Default)]
pub struct Environment {
    enclosing: Option<EnvRef>,
    values: HashMap<String, Value>,
}

impl Environment {
    /// A root scope with no enclosing scope, used for globals.
    pub fn global() -> EnvRef {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// A fresh, empty scope nested inside `enclosing`.
    pub fn enclose(enclosing: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            enclosing: Some(Rc::clone(enclosing)),
            values: HashMap::new(),
        }))
    }

    /// Binds `name` in this scope, replacing any existing binding.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Reads a binding from this scope only.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    /// Overwrites an existing binding in this scope only. Returns false if
    /// `name` is not bound here.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Reads `name` from the scope exactly `distance` links out from `env`.
    pub fn get_at(env: &EnvRef, distance: usize, name: &str) -> Option<Value> {
        Environment::ancestor(env, distance)?.borrow().get(name)
    }

    /// Assigns `name` in the scope exactly `distance` links out from `env`.
    pub fn assign_at(env: &EnvRef, distance: usize, name: &str, value: Value) -> bool {
        match Environment::ancestor(env, distance) {
            Some(scope) => scope.borrow_mut().assign(name, value),
            None => false,
        }
    }

    fn ancestor(env: &EnvRef, distance: usize) -> Option<EnvRef> {
        let mut scope = Rc::clone(env);
        for _ in 0..distance {
            let enclosing = scope.borrow().enclosing.clone()?;
            scope = enclosing;
        }
        Some(scope)
    }
}
