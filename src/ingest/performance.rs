//! Source performance bookkeeping: how one acquisition outcome moves a
//! source's success rate and adaptive memory.
//!
//! The rate is an exponential moving average toward 100 (success) or 0
//! (failure), clamped to [0, 100] on every write. Writers send the outcome,
//! not a new rate: the store applies the step to whatever value it holds, so
//! two runs over the same source both count.

use serde::Serialize;

use crate::error::PipelineError;
use crate::ingest::methods::ExtractionMethod;

/// Weight of the newest outcome in the moving average.
pub const SMOOTHING: f64 = 0.2;

pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return 0.0;
    }
    rate.clamp(0.0, 100.0)
}

/// Success: move the rate toward 100.
pub fn raised(rate: f64) -> f64 {
    let r = clamp_rate(rate);
    clamp_rate(r + (100.0 - r) * SMOOTHING)
}

/// Failure: move the rate toward 0.
pub fn lowered(rate: f64) -> f64 {
    let r = clamp_rate(rate);
    clamp_rate(r * (1.0 - SMOOTHING))
}

/// Result of one acquisition run as far as the success rate is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Failure,
}

impl RunOutcome {
    /// Value the moving average is pulled toward.
    pub fn target(self) -> f64 {
        match self {
            RunOutcome::Success => 100.0,
            RunOutcome::Failure => 0.0,
        }
    }

    pub fn apply(self, rate: f64) -> f64 {
        match self {
            RunOutcome::Success => raised(rate),
            RunOutcome::Failure => lowered(rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "op", content = "method")]
pub enum MemoryUpdate {
    Set(ExtractionMethod),
    Clear,
    Keep,
}

/// The single write an `execute` call makes to the performance store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceUpdate {
    pub outcome: RunOutcome,
    pub last_method: ExtractionMethod,
    pub memory: MemoryUpdate,
    pub execution_ms: i64,
    pub quality_metrics: serde_json::Value,
}

/// Persisted per-source performance record.
pub trait PerformanceStore: Send + Sync {
    fn record_performance(
        &self,
        source_id: &str,
        update: &PerformanceUpdate,
    ) -> Result<(), PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_stays_bounded_over_long_runs() {
        let mut r = 50.0;
        for i in 0..500 {
            r = if i % 7 == 0 { lowered(r) } else { raised(r) };
            assert!((0.0..=100.0).contains(&r));
        }
        for _ in 0..500 {
            r = lowered(r);
            assert!((0.0..=100.0).contains(&r));
        }
    }

    #[test]
    fn out_of_range_inputs_are_clamped_first() {
        assert_eq!(raised(250.0), 100.0);
        assert_eq!(lowered(-10.0), 0.0);
        assert_eq!(clamp_rate(f64::NAN), 0.0);
    }

    #[test]
    fn outcome_step_matches_its_target() {
        for r in [0.0, 32.0, 50.0, 99.5, 100.0] {
            let up = r + (RunOutcome::Success.target() - r) * SMOOTHING;
            let down = r + (RunOutcome::Failure.target() - r) * SMOOTHING;
            assert!((RunOutcome::Success.apply(r) - up).abs() < 1e-9);
            assert!((RunOutcome::Failure.apply(r) - down).abs() < 1e-9);
        }
    }

    #[test]
    fn success_moves_up_failure_moves_down() {
        assert!(raised(60.0) > 60.0);
        assert!(lowered(60.0) < 60.0);
        assert!((raised(60.0) - 68.0).abs() < 1e-9);
        assert!((lowered(60.0) - 48.0).abs() < 1e-9);
    }
}
