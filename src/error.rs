//! Error types for every stage of rule processing.
//!
//! Tokenize, resolve and evaluation failures are *rule-local*: the dispatcher
//! downgrades them to "did not match" and reports them through `tracing`.
//! [`CallbackError`] is the only error that escapes dispatch.

use thiserror::Error;

/// The tokenizer could not split a rule into segments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("unterminated {quote} literal starting at byte {offset}")]
    Unterminated { quote: char, offset: usize },
}

/// A placeholder could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid placeholder path '{0}'")]
    InvalidPath(String),
}

/// The resolved expression is not valid or cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unexpected character '{ch}' at byte {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unexpected {found} at byte {offset}")]
    UnexpectedToken { found: String, offset: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected trailing {found} at byte {offset}")]
    TrailingInput { found: String, offset: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(String),
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch { op: &'static str, left: &'static str, right: &'static str },
    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Any failure that makes a single rule count as "did not match".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("tokenize error: {0}")]
    Tokenize(#[from] TokenizeError),
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvalError),
}

/// A handler, event listener or interceptor failed.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("no method named '{0}' on this bot")]
    UnknownMethod(String),
    #[error("callback failed: {0}")]
    Failed(String),
    #[error("session write failed: {0}")]
    Session(#[from] ResolveError),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl CallbackError {
    pub fn failed<S: Into<String>>(message: S) -> Self {
        CallbackError::Failed(message.into())
    }
}
