//! The full per-rule pipeline: tokenize, resolve, evaluate.

use super::expr::evaluate_with_depth;
use super::resolve::resolve;
use super::tokenizer::tokenize;
use crate::context::ContextProvider;
use crate::error::RuleError;
use crate::Options;

/// Whether `rule` holds for `ctx`. An empty rule never matches.
pub(crate) fn check(rule: &str, ctx: &dyn ContextProvider, options: &Options) -> Result<bool, RuleError> {
    if rule.is_empty() {
        return Ok(false);
    }
    let tokens = tokenize(rule)?;
    let text = resolve(&tokens, ctx, options);
    Ok(evaluate_with_depth(&text, options.max_depth)?)
}
