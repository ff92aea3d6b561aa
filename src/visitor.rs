use crate::{expr::Expr, stmt::Stmt};

/// Implemented once per pass over the tree; each implementation matches
/// exhaustively on the node.
pub trait ExprVisitor<T> {
    fn visit_expr(&mut self, expr: &Expr) -> T;
}

pub trait StmtVisitor<T> {
    fn visit_stmt(&mut self, stmt: &Stmt) -> T;
}
