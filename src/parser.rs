use std::rc::Rc;

use log::debug;

use crate::{
    cursor::Cursor,
    error::{Diagnostics, StaticError},
    expr::{
        Assign, Binary, Call, Expr, ExprId, Get, Grouping, Literal, Logical, Set, Super, This,
        Unary, Variable,
    },
    stmt::{ClassDecl, FunctionDecl, Stmt},
    token::{LiteralValue, Token, TokenKind},
};

type Result<T> = std::result::Result<T, StaticError>;

/// Upper bound on call arguments and function parameters.
const MAX_ARITY: usize = 255;

pub struct Parser<'d> {
    cursor: Cursor<Token>,
    next_id: usize,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Parser<'d> {
    pub fn new(mut tokens: Vec<Token>, diagnostics: &'d mut Diagnostics) -> Self {
        if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
            let line = tokens.last().map_or(1, |token| token.line);
            tokens.push(Token::eof(line));
        }

        Parser {
            cursor: Cursor::new(tokens),
            next_id: 0,
            diagnostics,
        }
    }

    /// Starts numbering expression ids at `first_id`, so trees parsed by one
    /// session never share ids.
    pub fn starting_at(mut self, first_id: usize) -> Self {
        self.next_id = first_id;
        self
    }

    /// The first expression id not handed out by this parser.
    pub fn next_id(&self) -> usize {
        self.next_id
    }

    /// Parses the whole token stream. Syntax errors are reported to the
    /// diagnostics and the parser resynchronizes, so one pass can surface
    /// several independent errors; the returned statements are only
    /// meaningful when no error was reported.
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = vec![];
        while !self.is_at_end() {
            if let Some(stmt) = self.parse_declaration() {
                statements.push(stmt);
            }
        }
        debug!("parsed {} top-level statements", statements.len());
        statements
    }

    fn parse_declaration(&mut self) -> Option<Stmt> {
        let result = if self.eat(TokenKind::Class) {
            self.parse_class_declaration()
        } else if self.eat(TokenKind::Fun) {
            self.parse_function("function").map(|decl| Stmt::Function(Rc::new(decl)))
        } else if self.eat(TokenKind::Var) {
            self.parse_var_declaration()
        } else {
            self.parse_statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(error) => {
                self.diagnostics.report(error);
                self.synchronize();
                None
            }
        }
    }

    fn parse_class_declaration(&mut self) -> Result<Stmt> {
        let name = self.expect(TokenKind::Identifier, "Expect class name.")?;
        let superclass = if self.eat(TokenKind::Less) {
            let name = self.expect(TokenKind::Identifier, "Expect superclass name.")?;
            Some(Variable {
                id: self.fresh_id(),
                name,
            })
        } else {
            None
        };

        self.expect(TokenKind::LeftBrace, "Expect '{' before class body.")?;
        let mut methods = vec![];
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            methods.push(Rc::new(self.parse_function("method")?));
        }
        self.expect(TokenKind::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::Class(ClassDecl {
            name,
            superclass,
            methods,
        }))
    }

    fn parse_function(&mut self, kind: &str) -> Result<FunctionDecl> {
        let name = self.expect(TokenKind::Identifier, &format!("Expect {} name.", kind))?;
        self.expect(
            TokenKind::LeftParen,
            &format!("Expect '(' after {} name.", kind),
        )?;
        let mut params = vec![];
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= MAX_ARITY {
                    let error =
                        StaticError::at(self.cursor.peek(), "Can't have more than 255 parameters.");
                    self.diagnostics.report(error);
                }
                params.push(self.expect(TokenKind::Identifier, "Expect parameter name.")?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "Expect ')' after parameters.")?;
        self.expect(
            TokenKind::LeftBrace,
            &format!("Expect '{{' before {} body.", kind),
        )?;
        let body = self.parse_block()?;
        Ok(FunctionDecl { name, params, body })
    }

    fn parse_var_declaration(&mut self) -> Result<Stmt> {
        let name = self.expect(TokenKind::Identifier, "Expect variable name.")?;
        let initializer = if self.eat(TokenKind::Equal) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        )?;
        Ok(Stmt::Var(name, initializer))
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        if self.eat(TokenKind::For) {
            self.parse_for_statement()
        } else if self.eat(TokenKind::If) {
            self.parse_if_statement()
        } else if self.eat(TokenKind::Print) {
            self.parse_print_statement()
        } else if self.eat(TokenKind::Return) {
            self.parse_return_statement()
        } else if self.eat(TokenKind::While) {
            self.parse_while_statement()
        } else if self.eat(TokenKind::LeftBrace) {
            Ok(Stmt::Block(self.parse_block()?))
        } else {
            self.parse_expression_statement()
        }
    }

    /// `for` has no node of its own: it becomes a `while` loop, wrapped in
    /// blocks that hold the initializer and the increment.
    fn parse_for_statement(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::LeftParen, "Expect '(' after 'for'.")?;
        let initializer = if self.eat(TokenKind::Semicolon) {
            None
        } else if self.eat(TokenKind::Var) {
            Some(self.parse_var_declaration()?)
        } else {
            Some(self.parse_expression_statement()?)
        };
        let condition = if !self.check(TokenKind::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "Expect ';' after loop condition.")?;
        let increment = if !self.check(TokenKind::RightParen) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.parse_statement()?;
        if let Some(expr) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(expr)]);
        }
        let condition = condition.unwrap_or(Expr::Literal(Literal::Bool(true)));
        body = Stmt::While(condition, Box::new(body));
        if let Some(stmt) = initializer {
            body = Stmt::Block(vec![stmt, body]);
        }
        Ok(body)
    }

    fn parse_if_statement(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "Expect ')' after if condition.")?;

        let then_branch = self.parse_statement()?;
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If(condition, Box::new(then_branch), else_branch))
    }

    fn parse_print_statement(&mut self) -> Result<Stmt> {
        let keyword = self.cursor.previous().clone();
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print(keyword, value))
    }

    fn parse_return_statement(&mut self) -> Result<Stmt> {
        let keyword = self.cursor.previous().clone();
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return(keyword, value))
    }

    fn parse_while_statement(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "Expect ')' after condition.")?;
        let body = self.parse_statement()?;
        Ok(Stmt::While(condition, Box::new(body)))
    }

    /// Parses the statements of a block whose '{' was already consumed.
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        let mut statements = vec![];
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.parse_declaration() {
                statements.push(stmt);
            }
        }
        self.expect(TokenKind::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt> {
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let expr = self.parse_or()?;
        if !self.eat(TokenKind::Equal) {
            return Ok(expr);
        }

        let equals = self.cursor.previous().clone();
        let value = Box::new(self.parse_assignment()?);
        match expr {
            Expr::Variable(Variable { id, name }) => Ok(Expr::Assign(Assign { id, name, value })),
            Expr::Get(Get { object, name }) => Ok(Expr::Set(Set {
                object,
                name,
                value,
            })),
            // reported, but there is no need to resynchronize
            expr => {
                self.diagnostics
                    .report(StaticError::at(&equals, "Invalid assignment target."));
                Ok(expr)
            }
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.eat(TokenKind::Or) {
            let operator = self.cursor.previous().clone();
            let right = self.parse_and()?;
            expr = Expr::Logical(Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_equality()?;
        while self.eat(TokenKind::And) {
            let operator = self.cursor.previous().clone();
            let right = self.parse_equality()?;
            expr = Expr::Logical(Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut expr = self.parse_comparison()?;
        while self.cursor.peek().is_equality() {
            let operator = self.advance();
            let right = self.parse_comparison()?;
            expr = binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;
        while self.cursor.peek().is_comparison() {
            let operator = self.advance();
            let right = self.parse_term()?;
            expr = binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_factor()?;
        while self.cursor.peek().is_term() {
            let operator = self.advance();
            let right = self.parse_factor()?;
            expr = binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        while self.cursor.peek().is_factor() {
            let operator = self.advance();
            let right = self.parse_unary()?;
            expr = binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.cursor.peek().is_unary() {
            let operator = self.advance();
            let right = self.parse_unary()?;
            Ok(Expr::Unary(Unary {
                operator,
                right: Box::new(right),
            }))
        } else {
            self.parse_call()
        }
    }

    fn parse_call(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.eat(TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.eat(TokenKind::Dot) {
                let name =
                    self.expect(TokenKind::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get(Get {
                    object: Box::new(expr),
                    name,
                });
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let mut arguments = vec![];
        if !self.check(TokenKind::RightParen) {
            loop {
                if arguments.len() >= MAX_ARITY {
                    let error =
                        StaticError::at(self.cursor.peek(), "Can't have more than 255 arguments.");
                    self.diagnostics.report(error);
                }
                arguments.push(self.parse_expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self.expect(TokenKind::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::Call(Call {
            callee: Box::new(callee),
            paren,
            arguments,
        }))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.cursor.peek().clone();
        let kind = token.kind;
        let expr = match kind {
            TokenKind::False => Expr::Literal(Literal::Bool(false)),
            TokenKind::True => Expr::Literal(Literal::Bool(true)),
            TokenKind::Nil => Expr::Literal(Literal::Nil),
            TokenKind::Number | TokenKind::String => match &token.literal {
                Some(LiteralValue::Number(value)) => Expr::Literal(Literal::Number(*value)),
                Some(LiteralValue::String(value)) => Expr::Literal(Literal::String(value.clone())),
                None => return Err(StaticError::at(&token, "Expect literal value.")),
            },
            TokenKind::This => Expr::This(This {
                id: self.fresh_id(),
                keyword: token,
            }),
            TokenKind::Super => {
                self.bump();
                self.expect(TokenKind::Dot, "Expect '.' after 'super'.")?;
                let method =
                    self.expect(TokenKind::Identifier, "Expect superclass method name.")?;
                return Ok(Expr::Super(Super {
                    id: self.fresh_id(),
                    keyword: token,
                    method,
                }));
            }
            TokenKind::Identifier => Expr::Variable(Variable {
                id: self.fresh_id(),
                name: token,
            }),
            TokenKind::LeftParen => {
                self.bump();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "Expect ')' after expression.")?;
                return Ok(Expr::Grouping(Grouping {
                    expression: Box::new(expr),
                }));
            }
            _ => return Err(StaticError::at(&token, "Expect expression.")),
        };
        self.bump();
        Ok(expr)
    }

    /// Discards tokens until one that plausibly starts a new declaration or
    /// statement, or the end of input.
    fn synchronize(&mut self) {
        self.bump();
        while !self.is_at_end() && !self.cursor.peek().starts_statement() {
            self.bump();
        }
    }

    fn fresh_id(&mut self) -> ExprId {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Expects and consumes a token of kind `kind`, returning it. Signals an
    /// error at the current token otherwise.
    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(StaticError::at(self.cursor.peek(), message))
        }
    }

    /// Consumes the current token and returns it.
    fn advance(&mut self) -> Token {
        let token = self.cursor.peek().clone();
        self.bump();
        token
    }

    /// Consumes one token (moves the cursor forward by one).
    fn bump(&mut self) {
        self.cursor.bump();
    }

    /// Checks if the current token is of kind `kind`.
    fn check(&self, kind: TokenKind) -> bool {
        self.cursor.peek().kind == kind
    }

    /// Consumes a token of kind `kind` if it is next. Returns whether it was
    /// present.
    fn eat(&mut self, kind: TokenKind) -> bool {
        let is_present = self.check(kind);
        if is_present {
            self.bump()
        }
        is_present
    }

    fn is_at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }
}

fn binary(left: Expr, operator: Token, right: Expr) -> Expr {
    Expr::Binary(Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::scanner::Scanner;

    fn parse(source: &str) -> (Vec<Stmt>, Diagnostics) {
        let mut diagnostics = Diagnostics::default();
        let tokens = Scanner::new(source).scan_tokens(&mut diagnostics);
        let stmts = Parser::new(tokens, &mut diagnostics).parse();
        (stmts, diagnostics)
    }

    fn messages(diagnostics: &Diagnostics) -> Vec<String> {
        diagnostics.errors().iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn parse_print_stmt() {
        let tokens = vec![
            Token::new(TokenKind::Print, "print", 1),
            Token::with_literal(
                TokenKind::String,
                "\"one\"",
                LiteralValue::String("one".into()),
                1,
            ),
            Token::new(TokenKind::Semicolon, ";", 1),
            Token::eof(2),
        ];
        let mut diagnostics = Diagnostics::default();
        let result = Parser::new(tokens, &mut diagnostics).parse();
        let expected = vec![Stmt::Print(
            Token::new(TokenKind::Print, "print", 1),
            Expr::Literal(Literal::String("one".into())),
        )];
        assert_eq!(result, expected);
        assert!(!diagnostics.had_error());
    }

    #[test]
    fn unterminated_token_stream_is_accepted() {
        let tokens = vec![
            Token::new(TokenKind::Nil, "nil", 1),
            Token::new(TokenKind::Semicolon, ";", 1),
        ];
        let mut diagnostics = Diagnostics::default();
        let result = Parser::new(tokens, &mut diagnostics).parse();
        assert_eq!(result, vec![Stmt::Expression(Expr::Literal(Literal::Nil))]);
    }

    #[test]
    fn factor_binds_tighter_than_term() {
        let (stmts, _) = parse("1 + 2 * 3;");
        let Stmt::Expression(Expr::Binary(sum)) = &stmts[0] else {
            panic!("expected a binary expression, got {:?}", stmts[0]);
        };
        assert_eq!(sum.operator.kind, TokenKind::Plus);
        assert!(matches!(
            *sum.right,
            Expr::Binary(ref product) if product.operator.kind == TokenKind::Star
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let (stmts, diagnostics) = parse("a = b = 1;");
        assert!(!diagnostics.had_error());
        let Stmt::Expression(Expr::Assign(outer)) = &stmts[0] else {
            panic!("expected an assignment, got {:?}", stmts[0]);
        };
        assert_eq!(outer.name.lexeme, "a");
        assert!(matches!(*outer.value, Expr::Assign(ref inner) if inner.name.lexeme == "b"));
    }

    #[test]
    fn property_assignment_becomes_a_set() {
        let (stmts, _) = parse("a.b.c = 1;");
        let Stmt::Expression(Expr::Set(set)) = &stmts[0] else {
            panic!("expected a set, got {:?}", stmts[0]);
        };
        assert_eq!(set.name.lexeme, "c");
        assert!(matches!(*set.object, Expr::Get(ref get) if get.name.lexeme == "b"));
    }

    #[test]
    fn invalid_assignment_target_is_reported() {
        let (_, diagnostics) = parse("a + b = c;");
        assert_eq!(
            messages(&diagnostics),
            ["[line 1] Error at '=': Invalid assignment target."]
        );
    }

    #[test]
    fn for_loop_is_desugared_into_while() {
        let (stmts, diagnostics) = parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert!(!diagnostics.had_error());
        let Stmt::Block(outer) = &stmts[0] else {
            panic!("expected a block, got {:?}", stmts[0]);
        };
        assert!(matches!(outer[0], Stmt::Var(ref name, Some(_)) if name.lexeme == "i"));
        let Stmt::While(_, body) = &outer[1] else {
            panic!("expected a while loop, got {:?}", outer[1]);
        };
        assert!(matches!(**body, Stmt::Block(ref inner) if inner.len() == 2));
    }

    #[test]
    fn empty_for_clauses_loop_forever() {
        let (stmts, _) = parse("for (;;) {}");
        assert!(matches!(
            stmts[0],
            Stmt::While(Expr::Literal(Literal::Bool(true)), _)
        ));
    }

    #[test]
    fn class_with_superclass_and_methods() {
        let (stmts, diagnostics) =
            parse("class B < A { init(x) { this.x = x; } get() { return this.x; } }");
        assert!(!diagnostics.had_error());
        let Stmt::Class(class) = &stmts[0] else {
            panic!("expected a class, got {:?}", stmts[0]);
        };
        assert_eq!(class.name.lexeme, "B");
        assert_eq!(
            class.superclass.as_ref().map(|var| var.name.lexeme.as_str()),
            Some("A")
        );
        let names: Vec<&str> = class.methods.iter().map(|m| m.name.lexeme.as_str()).collect();
        assert_eq!(names, ["init", "get"]);
        assert_eq!(class.methods[0].params.len(), 1);
    }

    #[test]
    fn super_requires_a_method_name() {
        let (_, diagnostics) = parse("super;");
        assert_eq!(
            messages(&diagnostics),
            ["[line 1] Error at ';': Expect '.' after 'super'."]
        );
    }

    #[test]
    fn recovers_to_report_several_errors() {
        let (stmts, diagnostics) = parse("var = 1;\nprint 2;\nprint (3;\nvar ok = 4;");
        assert_eq!(
            messages(&diagnostics),
            [
                "[line 1] Error at '=': Expect variable name.",
                "[line 3] Error at ';': Expect ')' after expression.",
            ]
        );
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn missing_semicolon_at_end_of_input() {
        let (_, diagnostics) = parse("print 1");
        assert_eq!(
            messages(&diagnostics),
            ["[line 1] Error at end: Expect ';' after value."]
        );
    }

    #[test]
    fn too_many_arguments_is_not_fatal() {
        let arguments = vec!["1"; 256].join(", ");
        let (stmts, diagnostics) = parse(&format!("f({});", arguments));
        assert_eq!(
            messages(&diagnostics),
            ["[line 1] Error at '1': Can't have more than 255 arguments."]
        );
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn ids_are_unique_and_continue_from_the_starting_point() {
        let mut diagnostics = Diagnostics::default();
        let tokens = Scanner::new("a; b = a; this;").scan_tokens(&mut diagnostics);
        let mut parser = Parser::new(tokens, &mut diagnostics).starting_at(10);
        let stmts = parser.parse();
        assert_eq!(parser.next_id(), 14);
        let ids: Vec<ExprId> = stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Expression(Expr::Variable(var)) => Some(var.id),
                Stmt::Expression(Expr::Assign(assign)) => Some(assign.id),
                Stmt::Expression(Expr::This(this)) => Some(this.id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, [ExprId(10), ExprId(11), ExprId(13)]);
    }
}
