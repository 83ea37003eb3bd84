//! Ordered rule dispatch.
//!
//! Entries are tried strictly in registration order. An entry wins when its
//! rule is true *and* its callback returns a non-empty result; a matching
//! entry whose callback answers with nothing just lets the search continue.
//!
//! ```text
//! for entry in entries:
//!     rule ok & true ──▶ invoke ──▶ non-empty? ──▶ return
//!     rule error     ──▶ warn, treat as false
//! return None
//! ```
//!
//! Rule errors never abort the loop. Callback errors do: they are returned to
//! the caller untouched.

use super::check::check;
use super::metrics::{DispatchMetrics, DispatchOutcome};
use crate::context::ContextProvider;
use crate::error::CallbackError;
use crate::Options;
use serde_json::Value;
use std::time::Instant;

/// A rule paired with the callback it selects.
#[derive(Debug, Clone)]
pub struct HandlerEntry<C> {
    pub rule: String,
    pub callback: C,
}

impl<C> HandlerEntry<C> {
    pub fn new(rule: impl Into<String>, callback: C) -> Self {
        HandlerEntry { rule: rule.into(), callback }
    }
}

/// Whether a callback result means "no conclusive answer".
///
/// `None`, `null`, `false`, `""`, `[]` and `{}` are empty.
pub fn is_empty_result(result: &Option<Value>) -> bool {
    match result {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(Value::Bool(true)) | Some(Value::Number(_)) => false,
    }
}

/// Run `entries` in order and return the first non-empty callback result.
pub fn dispatch<C, F>(
    entries: &[HandlerEntry<C>],
    ctx: &dyn ContextProvider,
    options: &Options,
    invoke: F,
) -> Result<Option<Value>, CallbackError>
where
    F: FnMut(&C) -> Result<Option<Value>, CallbackError>,
{
    Ok(dispatch_with_metrics(entries, ctx, options, invoke)?.result)
}

/// Same as [`dispatch`], also returning counters and timing.
pub fn dispatch_with_metrics<C, F>(
    entries: &[HandlerEntry<C>],
    ctx: &dyn ContextProvider,
    options: &Options,
    mut invoke: F,
) -> Result<DispatchOutcome, CallbackError>
where
    F: FnMut(&C) -> Result<Option<Value>, CallbackError>,
{
    let start = Instant::now();
    let mut metrics = DispatchMetrics::default();

    for (idx, entry) in entries.iter().enumerate() {
        metrics.rules_evaluated += 1;
        let matched = match check(&entry.rule, ctx, options) {
            Ok(matched) => matched,
            Err(err) => {
                metrics.rule_errors += 1;
                tracing::warn!(index = idx, rule = %entry.rule, error = %err, "rule skipped");
                false
            }
        };
        if !matched {
            continue;
        }

        metrics.rules_matched += 1;
        let result = invoke(&entry.callback)?;
        if is_empty_result(&result) {
            tracing::debug!(index = idx, rule = %entry.rule, "matched rule produced no result");
            continue;
        }

        tracing::debug!(index = idx, rule = %entry.rule, "rule selected");
        metrics.winner = Some(idx);
        metrics.total = start.elapsed();
        return Ok(DispatchOutcome { result, metrics });
    }

    metrics.total = start.elapsed();
    Ok(DispatchOutcome { result: None, metrics })
}
