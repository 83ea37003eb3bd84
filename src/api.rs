use crate::context::ContextProvider;
use crate::engine::{self, evaluate_with_depth};
use crate::error::RuleError;
use crate::{Options, Token};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Tokenize, resolve and evaluate `rule` against `ctx`.
///
/// An empty rule never matches. Any stage failure is returned as a
/// [`RuleError`]; the dispatcher treats those as "did not match".
///
/// # Example
/// ```
/// use botsdk::{Options, Request, check_rule};
/// use serde_json::json;
///
/// let turn = Request::new(json!({
///     "request": {
///         "type": "IntentRequest",
///         "intents": [{ "name": "OpenIntent", "slots": { "city": { "value": "Beijing" } } }]
///     }
/// }));
/// assert!(check_rule("#OpenIntent && slot.city=='Beijing'", &turn, &Options::default()).unwrap());
/// ```
pub fn check_rule(rule: &str, ctx: &dyn ContextProvider, options: &Options) -> Result<bool, RuleError> {
    engine::check(rule, ctx, options)
}

/// Everything [`explain_rule`] learned about one rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    /// The rule as written.
    pub rule: String,
    /// Tokenizer output; empty when tokenizing failed.
    pub tokens: Vec<Token>,
    /// Expression text after placeholder substitution.
    pub resolved: Option<String>,
    /// Final verdict; `None` when a stage failed.
    pub matched: Option<bool>,
    /// Stage error, if any.
    pub error: Option<String>,
    /// Time spent across all stages.
    #[serde(serialize_with = "serialize_micros")]
    pub elapsed: Duration,
}

impl RuleReport {
    /// Whether the dispatcher would treat this rule as a match.
    pub fn is_match(&self) -> bool {
        self.matched == Some(true)
    }
}

fn serialize_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_micros())
}

/// Run `rule` through every stage and keep the intermediate results.
///
/// Unlike [`check_rule`] this never fails; errors are recorded in the report.
pub fn explain_rule(rule: &str, ctx: &dyn ContextProvider, options: &Options) -> RuleReport {
    let start = Instant::now();
    let mut report = RuleReport {
        rule: rule.to_string(),
        tokens: Vec::new(),
        resolved: None,
        matched: None,
        error: None,
        elapsed: Duration::ZERO,
    };

    if rule.is_empty() {
        report.matched = Some(false);
        report.elapsed = start.elapsed();
        return report;
    }

    match engine::tokenize(rule) {
        Ok(tokens) => {
            let text = engine::resolve(&tokens, ctx, options);
            report.tokens = tokens;
            match evaluate_with_depth(&text, options.max_depth) {
                Ok(verdict) => report.matched = Some(verdict),
                Err(err) => report.error = Some(RuleError::from(err).to_string()),
            }
            report.resolved = Some(text);
        }
        Err(err) => report.error = Some(RuleError::from(err).to_string()),
    }

    report.elapsed = start.elapsed();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::FakeTurn;
    use crate::{EvalError, TokenKind, TokenizeError};
    use pretty_assertions::assert_eq;

    #[test]
    fn check_rule_reports_stage_errors() {
        let ctx = FakeTurn::intent("OpenIntent");
        let opts = Options::default();

        assert_eq!(check_rule("#OpenIntent", &ctx, &opts), Ok(true));
        assert_eq!(check_rule("", &ctx, &opts), Ok(false));
        assert_eq!(
            check_rule("'open", &ctx, &opts),
            Err(RuleError::Tokenize(TokenizeError::Unterminated { quote: '\'', offset: 0 }))
        );
        assert_eq!(check_rule("#OpenIntent &&", &ctx, &opts), Err(RuleError::Evaluation(EvalError::UnexpectedEnd)));
    }

    #[test]
    fn explain_rule_keeps_intermediate_results() {
        let ctx = FakeTurn::intent("Weather").with_slot("city", "Beijing");
        let report = explain_rule("slot.city=='Beijing'", &ctx, &Options::default());

        assert_eq!(report.tokens.iter().map(|t| t.kind).collect::<Vec<_>>(), vec![TokenKind::Code, TokenKind::Literal]);
        assert_eq!(report.resolved.as_deref(), Some("\"Beijing\"=='Beijing'"));
        assert_eq!(report.matched, Some(true));
        assert!(report.is_match());
        assert_eq!(report.error, None);
    }

    #[test]
    fn explain_rule_records_errors() {
        let ctx = FakeTurn::intent("Weather");
        let report = explain_rule("slot.city > 3", &ctx, &Options::default());
        assert_eq!(report.resolved.as_deref(), Some("null > 3"));
        assert_eq!(report.matched, None);
        assert_eq!(report.error.as_deref(), Some("evaluation error: cannot apply '>' to null and number"));

        let broken = explain_rule("\"unterminated", &ctx, &Options::default());
        assert!(broken.tokens.is_empty());
        assert_eq!(broken.resolved, None);
        assert!(!broken.is_match());
    }
}
