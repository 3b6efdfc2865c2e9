//! # Strategy Selector
//! Chooses the primary extraction method for a source plus its fallback chain.
//!
//! Decision order:
//! 1. forced method (verbatim, registry fallback chain)
//! 2. adaptive memory: the method that last succeeded for this exact source,
//!    at a fixed high confidence
//! 3. ranking over URL-eligible methods by historical success rate
//!    (prior when no history), priority as tie-break

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ingest::methods::ExtractionMethod;
use crate::models::Source;

/// Confidence reported for a remembered method. Fixed, never recomputed.
pub const REMEMBERED_CONFIDENCE: f64 = 0.95;
pub const FORCED_CONFIDENCE: f64 = 1.0;

/// Average success rate per method across all sources.
pub type MethodHistory = HashMap<ExtractionMethod, f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum SelectionReason {
    Forced,
    Remembered,
    #[serde(rename_all = "camelCase")]
    Ranked {
        success_rate: f64,
        from_history: bool,
        url_match: bool,
        candidates: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub method: ExtractionMethod,
    pub fallback_chain: Vec<ExtractionMethod>,
    pub confidence: f64,
    #[serde(flatten)]
    pub reason: SelectionReason,
}

impl Strategy {
    fn for_method(method: ExtractionMethod, confidence: f64, reason: SelectionReason) -> Self {
        Self {
            method,
            fallback_chain: method.fallback_chain().to_vec(),
            confidence,
            reason,
        }
    }

    /// Primary followed by its fallbacks; this is what the executor walks.
    pub fn method_chain(&self) -> Vec<ExtractionMethod> {
        let mut chain = Vec::with_capacity(1 + self.fallback_chain.len());
        chain.push(self.method);
        chain.extend(self.fallback_chain.iter().copied());
        chain
    }
}

/// Pick the strategy for `source`.
///
/// `adaptive_hint` overrides the source's stored adaptive memory when given.
pub fn select(
    source: &Source,
    forced: Option<ExtractionMethod>,
    adaptive_hint: Option<ExtractionMethod>,
    history: &MethodHistory,
) -> Strategy {
    if let Some(m) = forced {
        return Strategy::for_method(m, FORCED_CONFIDENCE, SelectionReason::Forced);
    }

    if let Some(m) = adaptive_hint.or(source.last_successful_method) {
        return Strategy::for_method(m, REMEMBERED_CONFIDENCE, SelectionReason::Remembered);
    }

    rank(&source.url, history)
}

fn rank(address: &str, history: &MethodHistory) -> Strategy {
    let mut candidates: Vec<(ExtractionMethod, f64, bool)> = ExtractionMethod::ALL
        .iter()
        .copied()
        .filter(|m| m.is_eligible_for(address))
        .map(|m| match history.get(&m) {
            Some(rate) if rate.is_finite() => (m, rate.clamp(0.0, 100.0), true),
            _ => (m, m.prior_success_rate(), false),
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.priority().cmp(&b.0.priority()))
    });

    // Html and Browser carry no URL markers, so the list is never empty.
    let count = candidates.len();
    let (method, rate, from_history) = candidates
        .first()
        .copied()
        .unwrap_or((ExtractionMethod::Html, ExtractionMethod::Html.prior_success_rate(), false));

    Strategy::for_method(
        method,
        rate / 100.0,
        SelectionReason::Ranked {
            success_rate: rate,
            from_history,
            url_match: !method.is_eligible_for(""),
            candidates: count,
        },
    )
}
