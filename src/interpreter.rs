use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use log::{debug, trace};

use crate::env::{EnvRef, Environment};
use crate::error::RuntimeError;
use crate::expr::{Expr, ExprId, Literal};
use crate::object::{Class, Function, Native};
use crate::resolver::Locals;
use crate::stmt::{ClassDecl, Stmt};
use crate::token::{Token, TokenKind};
use crate::value::Value;
use crate::visitor::{ExprVisitor, StmtVisitor};

/// How a statement finished. A `return` unwinds through every enclosing
/// statement up to the function call that is running it.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    globals: EnvRef,
    env: EnvRef,
    locals: HashMap<ExprId, usize>,
    out: Box<dyn Write>,
}

impl Interpreter {
    /// An interpreter whose `print` statements write to `out`. Globals
    /// persist across calls to `interpret`.
    pub fn new(out: Box<dyn Write>) -> Self {
        let globals = Environment::global();
        let clock = Native::Clock;
        globals
            .borrow_mut()
            .define(clock.name(), Value::Native(clock));

        Interpreter {
            env: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            out,
        }
    }

    /// Adds the scope distances found by the resolver. Entries are never
    /// removed: closures created by earlier runs keep using their ids, so the
    /// table grows with every run in a session.
    pub fn resolve(&mut self, locals: Locals) {
        self.locals.extend(locals);
    }

    /// Executes statements in order, stopping at the first runtime error.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        debug!("interpreting {} statement(s)", statements.len());
        for stmt in statements {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    /// Runs `statements` with `env` as the current scope. The previous scope
    /// is restored however the block exits.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: EnvRef,
    ) -> Result<Flow, RuntimeError> {
        let previous = std::mem::replace(&mut self.env, env);
        let result = self.execute_all(statements);
        self.env = previous;
        result
    }

    fn execute_all(&mut self, statements: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in statements {
            if let Flow::Return(value) = self.visit_stmt(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn lookup_variable(&self, name: &Token, id: ExprId) -> Result<Value, RuntimeError> {
        let value = match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.env, distance, &name.lexeme),
            None => self.globals.borrow().get(&name.lexeme),
        };
        value.ok_or_else(|| undefined_variable(name))
    }

    fn assign_variable(&self, name: &Token, id: ExprId, value: Value) -> Result<(), RuntimeError> {
        let assigned = match self.locals.get(&id) {
            Some(&distance) => Environment::assign_at(&self.env, distance, &name.lexeme, value),
            None => self.globals.borrow_mut().assign(&name.lexeme, value),
        };
        if assigned {
            Ok(())
        } else {
            Err(undefined_variable(name))
        }
    }

    fn call(
        &mut self,
        callee: Value,
        paren: &Token,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let callable = callee
            .as_callable()
            .ok_or_else(|| RuntimeError::new(paren, "Can only call functions and classes."))?;

        if arguments.len() != callable.arity() {
            return Err(RuntimeError::new(
                paren,
                format!(
                    "Expected {} arguments but got {}.",
                    callable.arity(),
                    arguments.len()
                ),
            ));
        }

        trace!("calling {} with {} argument(s)", callee, arguments.len());
        callable.call(self, arguments)
    }

    fn define_class(&mut self, class: &ClassDecl) -> Result<(), RuntimeError> {
        // bound first so methods can refer to the class by name
        self.env
            .borrow_mut()
            .define(class.name.lexeme.clone(), Value::Nil);

        let superclass = match &class.superclass {
            Some(superclass) => match self.lookup_variable(&superclass.name, superclass.id)? {
                Value::Class(value) => Some(value),
                _ => {
                    return Err(RuntimeError::new(
                        &superclass.name,
                        "Superclass must be a class.",
                    ))
                }
            },
            None => None,
        };

        // methods of a subclass close over an extra scope holding `super`
        let closure = match &superclass {
            Some(superclass) => {
                let env = Environment::enclose(&self.env);
                env.borrow_mut()
                    .define("super", Value::Class(superclass.clone()));
                env
            }
            None => Rc::clone(&self.env),
        };

        let methods = class
            .methods
            .iter()
            .map(|method| {
                let is_initializer = method.name.lexeme == "init";
                let function =
                    Function::new(Rc::clone(method), Rc::clone(&closure), is_initializer);
                (method.name.lexeme.clone(), function)
            })
            .collect();

        let value = Class::new(class.name.lexeme.clone(), superclass, methods);
        debug!("defined class {:?}", value);
        self.env
            .borrow_mut()
            .define(class.name.lexeme.clone(), Value::Class(value));
        Ok(())
    }
}

impl StmtVisitor<Result<Flow, RuntimeError>> for Interpreter {
    fn visit_stmt(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Block(stmts) => {
                let env = Environment::enclose(&self.env);
                return self.execute_block(stmts, env);
            }
            Stmt::Class(class) => self.define_class(class)?,
            Stmt::Expression(expr) => {
                self.visit_expr(expr)?;
            }
            Stmt::Function(declaration) => {
                let function = Function::new(Rc::clone(declaration), Rc::clone(&self.env), false);
                self.env
                    .borrow_mut()
                    .define(declaration.name.lexeme.clone(), Value::Function(function));
            }
            Stmt::If(condition, then_branch, else_branch) => {
                if self.visit_expr(condition)?.is_truthy() {
                    return self.visit_stmt(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.visit_stmt(else_branch);
                }
            }
            Stmt::Print(keyword, expr) => {
                let value = self.visit_expr(expr)?;
                writeln!(self.out, "{}", value).map_err(|err| {
                    RuntimeError::new(keyword, format!("Could not write output: {}.", err))
                })?;
            }
            Stmt::Return(_, value) => {
                let value = match value {
                    Some(expr) => self.visit_expr(expr)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Var(name, initializer) => {
                let value = match initializer {
                    Some(expr) => self.visit_expr(expr)?,
                    None => Value::Nil,
                };
                self.env.borrow_mut().define(name.lexeme.clone(), value);
            }
            Stmt::While(condition, body) => {
                while self.visit_expr(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.visit_stmt(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
        }
        Ok(Flow::Normal)
    }
}

impl ExprVisitor<Result<Value, RuntimeError>> for Interpreter {
    fn visit_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Assign(assign) => {
                let value = self.visit_expr(&assign.value)?;
                self.assign_variable(&assign.name, assign.id, value.clone())?;
                Ok(value)
            }
            Expr::Binary(binary) => {
                let left = self.visit_expr(&binary.left)?;
                let right = self.visit_expr(&binary.right)?;
                evaluate_binary(&binary.operator, left, right)
            }
            Expr::Call(call) => {
                let callee = self.visit_expr(&call.callee)?;
                let mut arguments = Vec::with_capacity(call.arguments.len());
                for argument in &call.arguments {
                    arguments.push(self.visit_expr(argument)?);
                }
                self.call(callee, &call.paren, arguments)
            }
            Expr::Get(get) => match self.visit_expr(&get.object)? {
                Value::Instance(instance) => instance.get(&get.name),
                _ => Err(RuntimeError::new(
                    &get.name,
                    "Only instances have properties.",
                )),
            },
            Expr::Grouping(grouping) => self.visit_expr(&grouping.expression),
            Expr::Literal(literal) => Ok(match literal {
                Literal::Number(x) => Value::Number(*x),
                Literal::String(x) => Value::String(x.clone()),
                Literal::Bool(x) => Value::Bool(*x),
                Literal::Nil => Value::Nil,
            }),
            Expr::Logical(logical) => {
                let left = self.visit_expr(&logical.left)?;
                let short_circuits = match logical.operator.kind {
                    TokenKind::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.visit_expr(&logical.right)
                }
            }
            Expr::Set(set) => {
                let instance = match self.visit_expr(&set.object)? {
                    Value::Instance(instance) => instance,
                    _ => return Err(RuntimeError::new(&set.name, "Only instances have fields.")),
                };
                let value = self.visit_expr(&set.value)?;
                instance.set(&set.name, value.clone());
                Ok(value)
            }
            Expr::Super(super_) => {
                let distance = self.locals.get(&super_.id).copied().ok_or_else(|| {
                    RuntimeError::new(&super_.keyword, "Can't use 'super' outside of a class.")
                })?;
                let superclass = Environment::get_at(&self.env, distance, "super");
                // `this` is always bound one scope inside `super`
                let object = distance
                    .checked_sub(1)
                    .and_then(|distance| Environment::get_at(&self.env, distance, "this"));

                match (superclass, object) {
                    (Some(Value::Class(superclass)), Some(Value::Instance(object))) => {
                        match superclass.find_method(&super_.method.lexeme) {
                            Some(method) => Ok(Value::Function(method.bind(object))),
                            None => Err(RuntimeError::new(
                                &super_.method,
                                format!("Undefined property '{}'.", super_.method.lexeme),
                            )),
                        }
                    }
                    _ => Err(RuntimeError::new(
                        &super_.keyword,
                        "Can't use 'super' outside of a class.",
                    )),
                }
            }
            Expr::This(this) => self.lookup_variable(&this.keyword, this.id),
            Expr::Unary(unary) => {
                let right = self.visit_expr(&unary.right)?;
                match unary.operator.kind {
                    TokenKind::Bang => Ok(Value::Bool(!right.is_truthy())),
                    TokenKind::Minus => match right {
                        Value::Number(x) => Ok(Value::Number(-x)),
                        _ => Err(RuntimeError::new(
                            &unary.operator,
                            "Operand must be a number.",
                        )),
                    },
                    _ => unreachable!("unexpected unary operator {}", unary.operator.kind),
                }
            }
            Expr::Variable(variable) => self.lookup_variable(&variable.name, variable.id),
        }
    }
}

fn evaluate_binary(operator: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
    let value = match operator.kind {
        TokenKind::EqualEqual => Value::Bool(left.is_equal(&right)),
        TokenKind::BangEqual => Value::Bool(!left.is_equal(&right)),
        TokenKind::Plus => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(a), Value::String(b)) => Value::String(a + &b),
            _ => {
                return Err(RuntimeError::new(
                    operator,
                    "Operands must be two numbers or two strings.",
                ))
            }
        },
        _ => {
            let (a, b) = number_operands(operator, &left, &right)?;
            match operator.kind {
                TokenKind::Greater => Value::Bool(a > b),
                TokenKind::GreaterEqual => Value::Bool(a >= b),
                TokenKind::Less => Value::Bool(a < b),
                TokenKind::LessEqual => Value::Bool(a <= b),
                TokenKind::Minus => Value::Number(a - b),
                TokenKind::Slash => Value::Number(a / b),
                TokenKind::Star => Value::Number(a * b),
                _ => unreachable!("unexpected binary operator {}", operator.kind),
            }
        }
    };
    Ok(value)
}

fn number_operands(
    operator: &Token,
    left: &Value,
    right: &Value,
) -> Result<(f64, f64), RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(RuntimeError::new(operator, "Operands must be numbers.")),
    }
}

fn undefined_variable(name: &Token) -> RuntimeError {
    RuntimeError::new(name, format!("Undefined variable '{}'.", name.lexeme))
}
