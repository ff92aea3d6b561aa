use std::fmt::{self, Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::object::Callable;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    Clock,
}

impl Native {
    pub fn name(&self) -> &'static str {
        match self {
            Native::Clock => "clock",
        }
    }
}

impl Callable for Native {
    fn arity(&self) -> usize {
        match self {
            Native::Clock => 0,
        }
    }

    fn call(
        &self,
        _interpreter: &mut Interpreter,
        _arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match self {
            Native::Clock => {
                // a clock set before the epoch reads as zero
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                Ok(Value::Number(now.as_millis() as f64 / 1000.0))
            }
        }
    }
}

impl Display for Native {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn>")
    }
}
