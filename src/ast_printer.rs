use crate::expr::{Expr, Literal};
use crate::value::Value;
use crate::visitor::ExprVisitor;

/// Renders an expression as a fully parenthesized prefix form, e.g.
/// `-123 * (45.67)` becomes `(* (- 123) (group 45.67))`.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(&mut self, expr: &Expr) -> String {
        self.visit_expr(expr)
    }

    fn parenthesize<'a>(
        &mut self,
        name: &str,
        exprs: impl IntoIterator<Item = &'a Expr>,
    ) -> String {
        let mut out = format!("({}", name);
        for expr in exprs {
            out.push(' ');
            out.push_str(&self.visit_expr(expr));
        }
        out.push(')');
        out
    }
}

impl ExprVisitor<String> for AstPrinter {
    fn visit_expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Assign(assign) => {
                let name = format!("= {}", assign.name.lexeme);
                self.parenthesize(&name, [assign.value.as_ref()])
            }
            Expr::Binary(binary) => self.parenthesize(
                &binary.operator.lexeme,
                [binary.left.as_ref(), binary.right.as_ref()],
            ),
            Expr::Call(call) => {
                let callee = self.visit_expr(&call.callee);
                self.parenthesize(&format!("call {}", callee), &call.arguments)
            }
            Expr::Get(get) => {
                let object = self.visit_expr(&get.object);
                format!("(. {} {})", object, get.name.lexeme)
            }
            Expr::Grouping(grouping) => {
                self.parenthesize("group", [grouping.expression.as_ref()])
            }
            Expr::Literal(literal) => match literal {
                // numbers print the same way the interpreter shows them
                Literal::Number(x) => Value::Number(*x).to_string(),
                Literal::String(x) => x.clone(),
                Literal::Bool(x) => x.to_string(),
                Literal::Nil => String::from("nil"),
            },
            Expr::Logical(logical) => self.parenthesize(
                &logical.operator.lexeme,
                [logical.left.as_ref(), logical.right.as_ref()],
            ),
            Expr::Set(set) => {
                let object = self.visit_expr(&set.object);
                let target = format!("= (. {} {})", object, set.name.lexeme);
                self.parenthesize(&target, [set.value.as_ref()])
            }
            Expr::Super(super_) => format!("(super {})", super_.method.lexeme),
            Expr::This(_) => String::from("this"),
            Expr::Unary(unary) => {
                self.parenthesize(&unary.operator.lexeme, [unary.right.as_ref()])
            }
            Expr::Variable(variable) => variable.name.lexeme.clone(),
        }
    }
}
