//! Compliance evaluation: metrics against bounds
//!
//! Each [`Metric`] is compared against one [`Bound`] to produce a
//! [`Verdict`]. The margin is always "room remaining": positive inside the
//! acceptable region, negative by the amount of violation, measured to the
//! nearer bound for two-sided ranges. Indeterminate metrics pass straight
//! through as Indeterminate verdicts with no comparison, and aggregation can
//! never coerce them into a Pass or Fail.
//!
//! Bounds are the only stage-dependent input, so switching the test stage
//! re-runs this module against a different requirement set without touching
//! parsed traces or derived metrics.

use serde::{Deserialize, Serialize};

use crate::metrics::{Metric, MetricValue};

/// A requirement bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// Value must be at least this much (P1dB, rejection, IM3 dBc).
    Min(f64),
    /// Value must be at most this much (flatness, VSWR, NF).
    Max(f64),
    /// Value must sit inside [min, max] (gain).
    Range {
        /// Lower edge.
        min: f64,
        /// Upper edge.
        max: f64,
    },
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Min(v) => write!(f, ">= {v}"),
            Bound::Max(v) => write!(f, "<= {v}"),
            Bound::Range { min, max } => write!(f, "[{min}, {max}]"),
        }
    }
}

/// Pass/fail state of one verdict or one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Requirement met.
    Pass,
    /// Requirement violated.
    Fail,
    /// Not enough data to decide. Never treated as Pass or Fail.
    Indeterminate,
}

/// One metric compared against one bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Outcome.
    pub status: Status,
    /// Room remaining to the nearer bound; negative when failing. `None`
    /// when no finite comparison was possible (indeterminate metric or the
    /// infinite-VSWR sentinel).
    pub margin: Option<f64>,
    /// The metric that was judged.
    pub metric: Metric,
    /// The bound it was judged against.
    pub bound: Bound,
}

/// Evaluator tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorOptions {
    /// Largest acceptable nearest-sample substitution when a requirement
    /// frequency is off the trace's grid, GHz. Beyond this the verdict is
    /// Indeterminate rather than silently judged at the wrong frequency.
    pub grid_tolerance_ghz: f64,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            grid_tolerance_ghz: 0.01,
        }
    }
}

/// Compare one metric against one bound.
pub fn evaluate(metric: Metric, bound: Bound, options: &EvaluatorOptions) -> Verdict {
    if metric.is_indeterminate() {
        return Verdict {
            status: Status::Indeterminate,
            margin: None,
            metric,
            bound,
        };
    }

    if let Some(offset) = metric.grid_offset {
        if offset.offset_ghz() > options.grid_tolerance_ghz {
            let mut metric = metric;
            metric.indeterminate_reason = Some(format!(
                "nearest sample {:.4} GHz is {:.4} GHz from requirement frequency {:.4} GHz",
                offset.actual_ghz,
                offset.offset_ghz(),
                offset.requested_ghz,
            ));
            metric.value = None;
            return Verdict {
                status: Status::Indeterminate,
                margin: None,
                metric,
                bound,
            };
        }
    }

    match metric.value {
        Some(MetricValue::Scalar(value)) => {
            let margin = match bound {
                Bound::Min(min) => value - min,
                Bound::Max(max) => max - value,
                Bound::Range { min, max } => (value - min).min(max - value),
            };
            Verdict {
                status: if margin >= 0.0 { Status::Pass } else { Status::Fail },
                margin: Some(margin),
                metric,
                bound,
            }
        }
        // Infinite VSWR violates any finite maximum; no finite margin exists.
        Some(MetricValue::Infinite) => Verdict {
            status: match bound {
                Bound::Max(_) | Bound::Range { .. } => Status::Fail,
                Bound::Min(_) => Status::Pass,
            },
            margin: None,
            metric,
            bound,
        },
        None => Verdict {
            status: Status::Indeterminate,
            margin: None,
            metric,
            bound,
        },
    }
}

/// Aggregate constituent verdicts: Pass iff all Pass; any Fail wins over
/// Indeterminate; Indeterminate never collapses into Pass. An empty set is
/// Indeterminate: nothing was checked.
pub fn aggregate(verdicts: &[Verdict]) -> Status {
    if verdicts.is_empty() {
        return Status::Indeterminate;
    }
    let mut saw_indeterminate = false;
    for verdict in verdicts {
        match verdict.status {
            Status::Fail => return Status::Fail,
            Status::Indeterminate => saw_indeterminate = true,
            Status::Pass => {}
        }
    }
    if saw_indeterminate {
        Status::Indeterminate
    } else {
        Status::Pass
    }
}
