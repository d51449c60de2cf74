// ABOUTME: Error types for lexing, parsing, and evaluation failures

use thiserror::Error;

/// A source position attached to lex and parse errors. Runtime errors
/// intentionally carry no position (see Non-goals): once evaluation starts,
/// only the message is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LError {
    #[error("lex error at {pos}: {message}")]
    Lex { message: String, pos: Position },

    #[error("parse error at {pos}: {message}")]
    Parse { message: String, pos: Position },

    #[error("name error: {0}")]
    Name(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("value error: {0}")]
    Value(String),

    #[error("control error: {0}")]
    Control(String),
}

impl LError {
    pub fn lex(message: impl Into<String>, pos: Position) -> Self {
        LError::Lex {
            message: message.into(),
            pos,
        }
    }

    pub fn parse(message: impl Into<String>, pos: Position) -> Self {
        LError::Parse {
            message: message.into(),
            pos,
        }
    }

    pub fn name(message: impl Into<String>) -> Self {
        LError::Name(message.into())
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        LError::Type(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        LError::Index(message.into())
    }

    pub fn key(message: impl Into<String>) -> Self {
        LError::Key(message.into())
    }

    pub fn value(message: impl Into<String>) -> Self {
        LError::Value(message.into())
    }

    pub fn control(message: impl Into<String>) -> Self {
        LError::Control(message.into())
    }
}

pub type LResult<T> = Result<T, LError>;
