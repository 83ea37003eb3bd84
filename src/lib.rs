//! Rule-matching core of a voice-assistant webhook SDK.
//!
//! Applications describe *when* a handler should run with small condition
//! strings such as `#OpenIntent && slot.city=='Beijing'`. For every inbound
//! turn the engine tokenizes each rule, substitutes placeholders with values
//! read from the turn, evaluates the result with a closed expression grammar
//! and invokes the first handler that both matches and answers.
//!
//! ```text
//! rule ── tokenize ── resolve (ContextProvider) ── evaluate ── dispatch ── Bot::run
//! ```

#[macro_use]
mod macros;
mod api;
mod bot;
mod context;
mod engine;
mod error;

pub use api::{RuleReport, check_rule, explain_rule};
pub use bot::{
    Application, Bot, BotConfig, BotConfigBuilder, Callable, CallbackResult, Decision, Intercept, Invocable,
    JsonEnvelope, ResponseBuilder,
};
pub use context::{ContextProvider, Request, Session, SessionPath, TurnSource, TurnState};
pub use engine::{
    DispatchMetrics, DispatchOutcome, HandlerEntry, Scalar, dispatch, dispatch_with_metrics, evaluate, is_empty_result,
    resolve, tokenize,
};
pub use error::{CallbackError, EvalError, ResolveError, RuleError, TokenizeError};

use serde::Serialize;

// --- Rule tokens ------------------------------------------------------------

/// Kind of a rule segment produced by [`tokenize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// A quoted string literal, quotes included.
    Literal,
    /// Raw, unquoted rule text that may contain placeholders.
    Code,
}

/// One segment of a tokenized rule.
///
/// Concatenating the `text` of every token reproduces the rule exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub(crate) fn code(text: impl Into<String>) -> Self {
        Token { kind: TokenKind::Code, text: text.into() }
    }

    pub(crate) fn literal(text: impl Into<String>) -> Self {
        Token { kind: TokenKind::Literal, text: text.into() }
    }

    pub fn is_literal(&self) -> bool {
        self.kind == TokenKind::Literal
    }
}

/// Placeholder families recognised inside code segments, in substitution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    /// `#IntentName`
    IntentRef,
    /// `session.dotted.path`
    SessionRef,
    /// `slot.name`
    SlotRef,
    /// A code segment that is exactly `LaunchRequest` or `SessionEndedRequest`.
    RequestTypeLiteral,
}

impl PlaceholderKind {
    pub const ORDER: [PlaceholderKind; 4] = [
        PlaceholderKind::IntentRef,
        PlaceholderKind::SessionRef,
        PlaceholderKind::SlotRef,
        PlaceholderKind::RequestTypeLiteral,
    ];
}

// --- Options ----------------------------------------------------------------

/// Knobs that affect rule resolution and evaluation.
#[derive(Debug, Clone)]
pub struct Options {
    /// Value handed to [`ContextProvider::session_value`] as the default for
    /// every `session.` placeholder.
    pub session_default: serde_json::Value,
    /// Maximum nesting of `!` and parentheses accepted by the evaluator.
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options { session_default: serde_json::Value::Null, max_depth: 64 }
    }
}
