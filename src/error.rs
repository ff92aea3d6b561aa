use std::fmt;

use log::debug;
use thiserror::Error;

use crate::token::{Token, TokenKind};

/// Where in the source a static error was found, as rendered after the word
/// "Error" in a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Unknown,
    End,
    Lexeme(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unknown => Ok(()),
            Location::End => write!(f, " at end"),
            Location::Lexeme(lexeme) => write!(f, " at '{}'", lexeme),
        }
    }
}

/// A lexical, syntax or resolution error. Any of these stops the program
/// from being run at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct StaticError {
    pub line: u32,
    pub location: Location,
    pub message: String,
}

impl StaticError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        StaticError {
            line,
            location: Location::Unknown,
            message: message.into(),
        }
    }

    /// An error reported against a specific token.
    pub fn at(token: &Token, message: impl Into<String>) -> Self {
        let location = match token.kind {
            TokenKind::Eof => Location::End,
            _ => Location::Lexeme(token.lexeme.clone()),
        };
        StaticError {
            line: token.line,
            location,
            message: message.into(),
        }
    }
}

/// An error raised while executing a program. It aborts the rest of the
/// current run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}\n[line {line}]")]
pub struct RuntimeError {
    pub message: String,
    pub line: u32,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
            line: token.line,
        }
    }
}

/// Everything that went wrong during one run, in the order it was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    errors: Vec<StaticError>,
    runtime_error: Option<RuntimeError>,
}

impl Diagnostics {
    pub fn report(&mut self, error: StaticError) {
        debug!("static error: {}", error);
        self.errors.push(error);
    }

    pub fn report_runtime(&mut self, error: RuntimeError) {
        debug!("runtime error on line {}: {}", error.line, error.message);
        self.runtime_error = Some(error);
    }

    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn had_runtime_error(&self) -> bool {
        self.runtime_error.is_some()
    }

    pub fn errors(&self) -> &[StaticError] {
        &self.errors
    }

    pub fn runtime_error(&self) -> Option<&RuntimeError> {
        self.runtime_error.as_ref()
    }
}
