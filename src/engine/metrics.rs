//! Dispatch metrics.
//!
//! Collected by [`dispatch_with_metrics`](super::dispatch_with_metrics) for
//! debugging which rules fired and how long a turn spent in rule matching.
//! The plain [`dispatch`](super::dispatch) path fills the same struct and drops it.

use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchMetrics {
    /// Total elapsed time for the dispatch call.
    pub total: Duration,
    /// Rules tokenized, resolved and evaluated.
    pub rules_evaluated: usize,
    /// Rules that evaluated to true; each one had its callback invoked.
    pub rules_matched: usize,
    /// Rules downgraded to "did not match" because of an error.
    pub rule_errors: usize,
    /// Registration index of the entry whose result was returned.
    pub winner: Option<usize>,
}

/// Dispatch result bundled with its metrics.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub result: Option<Value>,
    pub metrics: DispatchMetrics,
}
