//! Rule-matching engine.
//!
//! ## How the parts work together
//!
//! ```text
//! rule ── tokenize ──▶ [Code | Literal]*          (tokenizer.rs)
//!                        │
//!                        ▼  ContextProvider
//!                      resolve ──▶ expression text (resolve.rs)
//!                        │
//!                        ▼
//!                      evaluate ──▶ bool         (expr.rs)
//!                        │
//!                        ▼
//!                      dispatch over HandlerEntry (dispatch.rs)
//! ```
//!
//! Tokenize, resolve and evaluate are pure functions of the rule text and the
//! context snapshot. Dispatch holds no state between calls, so one entry list
//! can serve many turns at once.
//!
//! ## Responsibilities by module
//!
//! - `tokenizer.rs`: quote-aware split into code and literal segments.
//! - `resolve.rs`: intent/session/slot/request-type substitution.
//! - `expr.rs`: closed-grammar parser and evaluator.
//! - `check.rs`: the three stages above run for one rule.
//! - `dispatch.rs`: first-match-with-result loop, error downgrading.
//! - `metrics.rs`: optional counters and timing for a dispatch.
//!
//! ## Debugging
//!
//! Every stage emits `tracing` events; run with `BOTSDK_LOG=botsdk=trace` to
//! see tokens, substitutions and verdicts.

#[path = "engine/check.rs"]
mod check;
#[path = "engine/dispatch.rs"]
mod dispatch;
#[path = "engine/expr.rs"]
mod expr;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/tokenizer.rs"]
mod tokenizer;

#[cfg(test)]
#[path = "engine/tests.rs"]
pub(crate) mod tests;

pub(crate) use check::check;
pub use dispatch::{HandlerEntry, dispatch, dispatch_with_metrics, is_empty_result};
pub use expr::{Scalar, evaluate};
pub(crate) use expr::evaluate_with_depth;
pub use metrics::{DispatchMetrics, DispatchOutcome};
pub use resolve::resolve;
pub use tokenizer::tokenize;
