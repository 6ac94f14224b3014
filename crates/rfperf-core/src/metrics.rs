//! Derived metric values with provenance
//!
//! A [`Metric`] is one named scalar derived from parsed traces: a worst-case
//! gain, a flatness figure, a P1dB point. Metrics are computed fresh per
//! evaluation run and never mutated afterwards. `Indeterminate`, meaning data
//! too thin or structurally incomplete to compute the value, is a first-class
//! state here, not a missing entry, so downstream aggregation can never
//! mistake absent data for a pass.
//!
//! When a requirement's nominal frequency is not on the trace's sample grid,
//! the metric is computed at the nearest sampled frequency and carries a
//! [`GridOffset`] so the evaluator can judge whether the offset is
//! acceptable.

use serde::{Deserialize, Serialize};

/// What a metric measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Minimum in-band gain, dB.
    GainMin,
    /// Maximum in-band gain, dB.
    GainMax,
    /// In-band gain flatness (max - min), dB.
    Flatness,
    /// Worst in-band VSWR.
    VswrMax,
    /// Out-of-band rejection for one window, dB.
    OutOfBandRejection,
    /// Output-referred 1 dB compression point, dBm.
    P1db,
    /// Output power at a required input level, dBm.
    PoutAtPin,
    /// IM3 suppression at a required input level, dBc.
    Im3AtPin,
    /// Gain at a requirement's nominal frequency (nearest sample), dB.
    GainAtFrequency,
    /// Worst-case noise figure over the operational band, dB.
    WorstCaseNf,
}

/// Scalar payload of a determinate metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    /// An ordinary finite value.
    Scalar(f64),
    /// The infinite-VSWR sentinel (total reflection). Never a float
    /// overflow; compared as larger than any finite bound.
    Infinite,
}

impl MetricValue {
    /// Finite value, if this is one.
    pub fn scalar(self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(v),
            MetricValue::Infinite => None,
        }
    }
}

/// Nearest-sample substitution made when a requirement frequency is off the
/// trace's grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridOffset {
    /// Frequency the requirement named, GHz.
    pub requested_ghz: f64,
    /// Sampled frequency actually used, GHz.
    pub actual_ghz: f64,
}

impl GridOffset {
    /// Absolute substitution distance in GHz.
    pub fn offset_ghz(&self) -> f64 {
        (self.actual_ghz - self.requested_ghz).abs()
    }
}

/// Where a metric came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Source filenames that contributed samples.
    pub sources: Vec<String>,
    /// Short computation method note, e.g. `"envelope max"`.
    pub method: String,
}

impl Provenance {
    /// Provenance from one source file.
    pub fn single(source: &str, method: &str) -> Self {
        Self {
            sources: vec![source.to_string()],
            method: method.to_string(),
        }
    }
}

/// One derived, immutable metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// What is measured.
    pub kind: MetricKind,
    /// Human-readable identity, e.g. `"S21 PRI flatness"`.
    pub label: String,
    /// The value, absent when indeterminate.
    pub value: Option<MetricValue>,
    /// Why the value could not be computed, when it could not.
    pub indeterminate_reason: Option<String>,
    /// Source traces and method.
    pub provenance: Provenance,
    /// Grid substitution, when the requirement frequency was off-grid.
    pub grid_offset: Option<GridOffset>,
}

impl Metric {
    /// A determinate scalar metric.
    pub fn scalar(kind: MetricKind, label: impl Into<String>, value: f64, provenance: Provenance) -> Self {
        Self {
            kind,
            label: label.into(),
            value: Some(MetricValue::Scalar(value)),
            indeterminate_reason: None,
            provenance,
            grid_offset: None,
        }
    }

    /// The infinite-VSWR metric.
    pub fn infinite(kind: MetricKind, label: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            kind,
            label: label.into(),
            value: Some(MetricValue::Infinite),
            indeterminate_reason: None,
            provenance,
            grid_offset: None,
        }
    }

    /// An indeterminate metric with the reason it could not be computed.
    pub fn indeterminate(
        kind: MetricKind,
        label: impl Into<String>,
        reason: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            value: None,
            indeterminate_reason: Some(reason.into()),
            provenance,
            grid_offset: None,
        }
    }

    /// Attach a grid-offset annotation.
    pub fn with_grid_offset(mut self, offset: GridOffset) -> Self {
        self.grid_offset = Some(offset);
        self
    }

    /// Whether the metric failed to produce a value.
    pub fn is_indeterminate(&self) -> bool {
        self.value.is_none()
    }
}
