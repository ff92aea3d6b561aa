use std::rc::Rc;

use crate::expr::{Expr, Variable};
use crate::token::Token;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Vec<Stmt>),
    Class(ClassDecl),
    Expression(Expr),
    Function(Rc<FunctionDecl>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    /// The `print` keyword is kept for error reporting.
    Print(Token, Expr),
    Return(Token, Option<Expr>),
    Var(Token, Option<Expr>),
    While(Expr, Box<Stmt>),
}

/// A function or method declaration. Shared, since every closure created
/// from it keeps the declaration alive.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Token,
    pub superclass: Option<Variable>,
    pub methods: Vec<Rc<FunctionDecl>>,
}
