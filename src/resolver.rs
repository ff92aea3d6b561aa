use std::collections::HashMap;

use log::trace;

use crate::{
    error::{Diagnostics, StaticError},
    expr::{Expr, ExprId, Variable},
    stmt::{FunctionDecl, Stmt},
    token::Token,
    visitor::{ExprVisitor, StmtVisitor},
};

/// Scope distance for every expression that refers to a local binding.
/// Expressions missing from the table refer to globals.
pub type Locals = HashMap<ExprId, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

pub struct Resolver<'d> {
    /// One map per enclosing scope; a name maps to whether its initializer
    /// has finished resolving.
    scopes: Vec<HashMap<String, bool>>,
    locals: Locals,
    current_function: FunctionKind,
    current_class: ClassKind,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Resolver<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Resolver {
            scopes: vec![],
            locals: Locals::new(),
            current_function: FunctionKind::None,
            current_class: ClassKind::None,
            diagnostics,
        }
    }

    /// Resolves a whole program. Errors are reported and resolution carries
    /// on, so every static error in the program is surfaced.
    pub fn resolve(mut self, statements: &[Stmt]) -> Locals {
        for stmt in statements {
            self.visit_stmt(stmt);
        }
        self.locals
    }

    fn resolve_function(&mut self, function: &FunctionDecl, kind: FunctionKind) {
        let enclosing_function = std::mem::replace(&mut self.current_function, kind);

        self.begin_scope();
        for param in &function.params {
            self.declare(param);
            self.define(param);
        }
        for stmt in &function.body {
            self.visit_stmt(stmt);
        }
        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn resolve_variable(&mut self, variable: &Variable) {
        let name = &variable.name;
        if self.scopes.last().and_then(|scope| scope.get(&name.lexeme)) == Some(&false) {
            self.error(name, "Can't read local variable in its own initializer.");
        }
        self.resolve_local(variable.id, &name.lexeme);
    }

    /// Records how many scopes out from the innermost one `name` is bound.
    /// Names bound in no scope are left for the global lookup.
    fn resolve_local(&mut self, id: ExprId, name: &str) {
        let found = self
            .scopes
            .iter()
            .rev()
            .position(|scope| scope.contains_key(name));
        if let Some(distance) = found {
            trace!("resolved {:?} ({}) at distance {}", id, name, distance);
            self.locals.insert(id, distance);
        }
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(&name.lexeme) {
            self.error(name, "Already a variable with this name in this scope.");
            return;
        }
        scope.insert(name.lexeme.clone(), false);
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    /// Binds a name the language provides implicitly (`this`, `super`).
    fn bind_implicit(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), true);
        }
    }

    fn begin_scope(&mut self) {
        trace!("entering scope at depth {}", self.scopes.len() + 1);
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes
            .pop()
            .unwrap_or_else(|| unreachable!("attempted to pop the global scope"));
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.diagnostics.report(StaticError::at(token, message));
    }
}

impl StmtVisitor<()> for Resolver<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                self.begin_scope();
                for stmt in stmts {
                    self.visit_stmt(stmt);
                }
                self.end_scope();
            }
            Stmt::Class(class) => {
                let enclosing_class = std::mem::replace(&mut self.current_class, ClassKind::Class);

                self.declare(&class.name);
                self.define(&class.name);

                if let Some(superclass) = &class.superclass {
                    if superclass.name.lexeme == class.name.lexeme {
                        self.error(&superclass.name, "A class can't inherit from itself.");
                    }
                    self.current_class = ClassKind::Subclass;
                    self.resolve_variable(superclass);

                    self.begin_scope();
                    self.bind_implicit("super");
                }

                self.begin_scope();
                self.bind_implicit("this");
                for method in &class.methods {
                    let kind = if method.name.lexeme == "init" {
                        FunctionKind::Initializer
                    } else {
                        FunctionKind::Method
                    };
                    self.resolve_function(method, kind);
                }
                self.end_scope();

                if class.superclass.is_some() {
                    self.end_scope();
                }

                self.current_class = enclosing_class;
            }
            Stmt::Expression(expr) | Stmt::Print(_, expr) => self.visit_expr(expr),
            Stmt::Function(function) => {
                // defined before the body is resolved, so it can recurse
                self.declare(&function.name);
                self.define(&function.name);
                self.resolve_function(function, FunctionKind::Function);
            }
            Stmt::If(condition, then_branch, else_branch) => {
                self.visit_expr(condition);
                self.visit_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.visit_stmt(else_branch);
                }
            }
            Stmt::Return(keyword, value) => {
                if self.current_function == FunctionKind::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionKind::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.visit_expr(value);
                }
            }
            Stmt::Var(name, initializer) => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.visit_expr(initializer);
                }
                self.define(name);
            }
            Stmt::While(condition, body) => {
                self.visit_expr(condition);
                self.visit_stmt(body);
            }
        }
    }
}

impl ExprVisitor<()> for Resolver<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Assign(assign) => {
                self.visit_expr(&assign.value);
                self.resolve_local(assign.id, &assign.name.lexeme);
            }
            Expr::Binary(binary) => {
                self.visit_expr(&binary.left);
                self.visit_expr(&binary.right);
            }
            Expr::Call(call) => {
                self.visit_expr(&call.callee);
                for argument in &call.arguments {
                    self.visit_expr(argument);
                }
            }
            Expr::Get(get) => self.visit_expr(&get.object),
            Expr::Grouping(grouping) => self.visit_expr(&grouping.expression),
            Expr::Literal(_) => {}
            Expr::Logical(logical) => {
                self.visit_expr(&logical.left);
                self.visit_expr(&logical.right);
            }
            Expr::Set(set) => {
                self.visit_expr(&set.value);
                self.visit_expr(&set.object);
            }
            Expr::Super(super_) => match self.current_class {
                ClassKind::None => {
                    self.error(&super_.keyword, "Can't use 'super' outside of a class.")
                }
                ClassKind::Class => self.error(
                    &super_.keyword,
                    "Can't use 'super' in a class with no superclass.",
                ),
                ClassKind::Subclass => self.resolve_local(super_.id, "super"),
            },
            Expr::This(this) => {
                if self.current_class == ClassKind::None {
                    self.error(&this.keyword, "Can't use 'this' outside of a class.");
                    return;
                }
                self.resolve_local(this.id, "this");
            }
            Expr::Unary(unary) => self.visit_expr(&unary.right),
            Expr::Variable(variable) => self.resolve_variable(variable),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{parser::Parser, scanner::Scanner};

    fn resolve(source: &str) -> (Vec<Stmt>, Locals, Vec<String>) {
        let mut diagnostics = Diagnostics::default();
        let tokens = Scanner::new(source).scan_tokens(&mut diagnostics);
        let stmts = Parser::new(tokens, &mut diagnostics).parse();
        assert!(!diagnostics.had_error(), "{:?}", diagnostics.errors());
        let locals = Resolver::new(&mut diagnostics).resolve(&stmts);
        let messages = diagnostics.errors().iter().map(|e| e.to_string()).collect();
        (stmts, locals, messages)
    }

    fn errors(source: &str) -> Vec<String> {
        resolve(source).2
    }

    #[test]
    fn globals_are_not_recorded() {
        let (_, locals, messages) = resolve("var a = 1; print a; a = 2;");
        assert!(messages.is_empty());
        assert!(locals.is_empty());
    }

    #[test]
    fn distances_count_scopes_from_the_use() {
        let (stmts, locals, _) = resolve("{ var a = 1; { print a; } { { a = 2; } } }");
        let Stmt::Block(outer) = &stmts[0] else {
            panic!("expected a block");
        };
        let Stmt::Block(first) = &outer[1] else {
            panic!("expected a block");
        };
        let Stmt::Print(_, Expr::Variable(read)) = &first[0] else {
            panic!("expected a print of a variable");
        };
        assert_eq!(locals.get(&read.id), Some(&1));

        let Stmt::Block(second) = &outer[2] else {
            panic!("expected a block");
        };
        let Stmt::Block(nested) = &second[0] else {
            panic!("expected a block");
        };
        let Stmt::Expression(Expr::Assign(write)) = &nested[0] else {
            panic!("expected an assignment");
        };
        assert_eq!(locals.get(&write.id), Some(&2));
    }

    #[test]
    fn closure_binds_to_the_declaration_visible_at_its_definition() {
        let source = "var a = 1; { fun show() { print a; } var a = 2; }";
        let (_, locals, messages) = resolve(source);
        assert!(messages.is_empty());
        // `a` inside `show` resolves to the global, not the later local
        assert!(locals.is_empty());
    }

    #[test]
    fn reading_a_local_in_its_own_initializer() {
        assert_eq!(
            errors("{ var a = a; }"),
            ["[line 1] Error at 'a': Can't read local variable in its own initializer."]
        );
        // fine at the top level, where the name is a global
        assert!(errors("var a = a;").is_empty());
    }

    #[test]
    fn duplicate_declaration_in_one_scope() {
        assert_eq!(
            errors("fun bad() {\n  var a = \"first\";\n  var a = \"second\";\n}"),
            ["[line 3] Error at 'a': Already a variable with this name in this scope."]
        );
        assert!(errors("var a = 1; var a = 2;").is_empty());
    }

    #[test]
    fn return_outside_of_a_function() {
        assert_eq!(
            errors("return \"at top level\";"),
            ["[line 1] Error at 'return': Can't return from top-level code."]
        );
    }

    #[test]
    fn returning_a_value_from_an_initializer() {
        assert_eq!(
            errors("class Baz { init() { return \"baz\"; } }"),
            ["[line 1] Error at 'return': Can't return a value from an initializer."]
        );
        assert!(errors("class Bar { init() { return; } }").is_empty());
    }

    #[test]
    fn this_and_super_need_an_enclosing_class() {
        assert_eq!(
            errors("print this;"),
            ["[line 1] Error at 'this': Can't use 'this' outside of a class."]
        );
        assert_eq!(
            errors("fun f() { super.go(); }"),
            ["[line 1] Error at 'super': Can't use 'super' outside of a class."]
        );
        assert_eq!(
            errors("class Eclair { cook() { super.cook(); } }"),
            ["[line 1] Error at 'super': Can't use 'super' in a class with no superclass."]
        );
    }

    #[test]
    fn class_context_is_restored_after_nested_classes() {
        let source = "class A < B { m() { class C { n() { return this; } } return super.m; } }";
        assert!(errors(source).is_empty());
        assert_eq!(
            errors("class A { m() { class C < D {} return super.m; } }"),
            ["[line 1] Error at 'super': Can't use 'super' in a class with no superclass."]
        );
    }

    #[test]
    fn a_class_cannot_inherit_from_itself() {
        assert_eq!(
            errors("class Oops < Oops {}"),
            ["[line 1] Error at 'Oops': A class can't inherit from itself."]
        );
    }

    #[test]
    fn this_and_super_resolve_through_method_scopes() {
        let (stmts, locals, _) = resolve("class A < B { m() { this; super.m; } }");
        let Stmt::Class(class) = &stmts[0] else {
            panic!("expected a class");
        };
        let body = &class.methods[0].body;
        let Stmt::Expression(Expr::This(this)) = &body[0] else {
            panic!("expected `this`");
        };
        let Stmt::Expression(Expr::Super(super_)) = &body[1] else {
            panic!("expected `super`");
        };
        // method scope -> `this` scope -> `super` scope
        assert_eq!(locals.get(&this.id), Some(&1));
        assert_eq!(locals.get(&super_.id), Some(&2));
    }

    #[test]
    fn several_errors_are_reported_in_one_pass() {
        let messages = errors("return 1;\nprint this;\n{ var x = 1; var x = 2; }");
        assert_eq!(messages.len(), 3);
    }
}
