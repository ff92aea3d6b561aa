use std::str::CharIndices;

use itertools::{Itertools, MultiPeek};
use log::debug;

use crate::error::{Diagnostics, StaticError};
use crate::token::{LiteralValue, Token, TokenKind};

type CharIter<'a> = MultiPeek<CharIndices<'a>>;

type ScanResult = Result<Option<Token>, StaticError>;

pub struct Scanner<'a> {
    source: &'a str,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner { source }
    }

    /// Scans the whole source. Lexical errors are reported to `diagnostics`
    /// and skipped, so the returned stream is always complete and ends with
    /// an `Eof` token.
    pub fn scan_tokens(&self, diagnostics: &mut Diagnostics) -> Vec<Token> {
        let mut iter = self.source.char_indices().multipeek();
        let mut tokens: Vec<Token> = vec![];
        let mut line: u32 = 1;

        loop {
            match self.scan_token(&mut iter, &mut line) {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => break,
                Err(error) => diagnostics.report(error),
            }
        }

        tokens.push(Token::eof(line));
        debug!("scanned {} tokens over {} lines", tokens.len(), line);

        tokens
    }

    fn scan_token(&self, iter: &mut CharIter, line: &mut u32) -> ScanResult {
        loop {
            iter.reset_peek(); // reset the "peek" cursor

            if let Some((start, char)) = iter.next() {
                // in most cases we want to break and return, but if we encounter
                // whitespace or a comment, we continue the loop instead
                break match char {
                    '(' => self.create_token(TokenKind::LeftParen, start, iter, line),
                    ')' => self.create_token(TokenKind::RightParen, start, iter, line),
                    '{' => self.create_token(TokenKind::LeftBrace, start, iter, line),
                    '}' => self.create_token(TokenKind::RightBrace, start, iter, line),
                    ',' => self.create_token(TokenKind::Comma, start, iter, line),
                    '.' => self.create_token(TokenKind::Dot, start, iter, line),
                    '-' => self.create_token(TokenKind::Minus, start, iter, line),
                    '+' => self.create_token(TokenKind::Plus, start, iter, line),
                    ';' => self.create_token(TokenKind::Semicolon, start, iter, line),
                    '*' => self.create_token(TokenKind::Star, start, iter, line),
                    '!' => {
                        let kind = self.pick(iter, TokenKind::BangEqual, TokenKind::Bang);
                        self.create_token(kind, start, iter, line)
                    }
                    '=' => {
                        let kind = self.pick(iter, TokenKind::EqualEqual, TokenKind::Equal);
                        self.create_token(kind, start, iter, line)
                    }
                    '<' => {
                        let kind = self.pick(iter, TokenKind::LessEqual, TokenKind::Less);
                        self.create_token(kind, start, iter, line)
                    }
                    '>' => {
                        let kind = self.pick(iter, TokenKind::GreaterEqual, TokenKind::Greater);
                        self.create_token(kind, start, iter, line)
                    }
                    '/' => {
                        if self.peek_match(iter, |ch| ch == '/') {
                            iter.next();
                            // A comment goes until the end of the line
                            self.read_to_end_of_line(iter);
                            continue;
                        } else {
                            self.create_token(TokenKind::Slash, start, iter, line)
                        }
                    }
                    '"' => self.parse_string(iter, start, line),
                    ' ' | '\r' | '\t' => continue,
                    '\n' => {
                        *line += 1;
                        continue;
                    }
                    char if char.is_ascii_digit() => self.parse_number(iter, start, line),
                    char if char.is_ascii_alphabetic() || char == '_' => {
                        self.parse_identifier(iter, start, line)
                    }
                    _ => Err(StaticError::new(*line, "Unexpected character.")),
                };
            } else {
                // No more tokens left.
                return Ok(None);
            }
        }
    }

    // helper method
    fn create_token(
        &self,
        kind: TokenKind,
        start: usize,
        iter: &mut CharIter,
        line: &u32,
    ) -> ScanResult {
        let lexeme = &self.source[start..self.offset(iter)];
        Ok(Some(Token::new(kind, lexeme, *line)))
    }

    /// Byte offset of the next unconsumed character.
    fn offset(&self, iter: &mut CharIter) -> usize {
        iter.reset_peek();
        let offset = iter.peek().map_or(self.source.len(), |(idx, _)| *idx);
        iter.reset_peek();
        offset
    }

    /// Consumes a following '=' and returns `two`, otherwise returns `one`.
    fn pick(&self, iter: &mut CharIter, two: TokenKind, one: TokenKind) -> TokenKind {
        if self.peek_match(iter, |ch| ch == '=') {
            iter.next();
            two
        } else {
            one
        }
    }

    /// Returns true if there is another character to peek which matches the
    /// predicate, otherwise it returns false.
    fn peek_match<F>(&self, iter: &mut CharIter, pred: F) -> bool
    where
        F: FnOnce(char) -> bool,
    {
        iter.reset_peek();
        if let Some(pair) = iter.peek() {
            pred(pair.1)
        } else {
            false
        }
    }

    fn read_to_end_of_line(&self, iter: &mut CharIter) {
        while self.peek_match(iter, |ch| ch != '\n') {
            iter.next();
        }
    }

    fn parse_string(&self, iter: &mut CharIter, start: usize, line: &mut u32) -> ScanResult {
        while let Some((_, char)) = iter.next() {
            match char {
                '"' => {
                    let end = self.offset(iter);
                    let lexeme = &self.source[start..end];
                    let value = self.source[start + 1..end - 1].to_owned();
                    return Ok(Some(Token::with_literal(
                        TokenKind::String,
                        lexeme,
                        LiteralValue::String(value),
                        *line,
                    )));
                }
                '\n' => *line += 1,
                _ => {}
            }
        }

        Err(StaticError::new(*line, "Unterminated string."))
    }

    fn parse_number(&self, iter: &mut CharIter, start: usize, line: &mut u32) -> ScanResult {
        while self.peek_match(iter, |ch| ch.is_ascii_digit()) {
            iter.next();
        }

        // Look for a fractional part
        iter.reset_peek();
        if matches!(iter.peek(), Some((_, '.'))) && matches!(iter.peek(), Some((_, '0'..='9'))) {
            // consume the ".", which also resets the peek lookahead
            iter.next();

            while self.peek_match(iter, |ch| ch.is_ascii_digit()) {
                iter.next();
            }
        }

        let lexeme = &self.source[start..self.offset(iter)];
        let value: f64 = lexeme
            .parse()
            .map_err(|_| StaticError::new(*line, format!("Invalid number '{}'.", lexeme)))?;
        Ok(Some(Token::with_literal(
            TokenKind::Number,
            lexeme,
            LiteralValue::Number(value),
            *line,
        )))
    }

    fn parse_identifier(&self, iter: &mut CharIter, start: usize, line: &mut u32) -> ScanResult {
        while self.peek_match(iter, |ch| ch.is_ascii_alphanumeric() || ch == '_') {
            iter.next();
        }

        let text = &self.source[start..self.offset(iter)];
        let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
        Ok(Some(Token::new(kind, text, *line)))
    }
}
