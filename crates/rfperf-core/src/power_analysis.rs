//! Power sweep analysis: compression and intermodulation
//!
//! P1dB is found by fitting a unit-slope small-signal gain line through the
//! low-power linear region of a single-tone sweep, then locating the first
//! input power where the measured output falls 1 dB below that line,
//! linearly interpolated between the bracketing samples. Sweeps whose
//! linear region holds fewer than 3 points cannot anchor the reference line
//! and are reported as such (Indeterminate downstream, never a guess).
//!
//! IM3/IM5 suppression comes from the spectrum markers of two-tone records:
//! markers 1/2 are the fundamentals, 3/4 the IM3 products, 5/6 the IM5
//! products. Suppression is the conservative worst case (the weaker
//! fundamental minus the stronger product) in dBc, larger meaning cleaner.
//! Single-tone records never produce intermodulation values.

use crate::power_csv::{PowerLinearityRecord, PowerSweep, ToneMode};

/// Deviation from the small-signal line that defines the compression point.
pub const COMPRESSION_DB: f64 = 1.0;

/// Fraction of the sweep's input-power span counted as the low-power linear
/// region for the reference-line fit.
pub const LINEAR_REGION_FRACTION: f64 = 1.0 / 3.0;

/// A located 1 dB compression point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct P1dbResult {
    /// Input power at compression, dBm.
    pub input_dbm: f64,
    /// Output power at compression, dBm.
    pub output_dbm: f64,
    /// Fitted small-signal gain, dB.
    pub small_signal_gain_db: f64,
}

/// Outcome of a P1dB search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum P1dbOutcome {
    /// Compression point found.
    Found(P1dbResult),
    /// Too few samples in the linear region to fit a reference line.
    InsufficientLinearRegion {
        /// Points that fell inside the region.
        points: usize,
    },
    /// The sweep never deviates 1 dB from the reference line.
    NoCompression {
        /// Largest deviation seen, dB.
        max_deviation_db: f64,
    },
}

/// Find the 1 dB compression point of a single-tone sweep.
///
/// `pin_dbm`/`pout_dbm` must be the same length with `pin_dbm` ascending,
/// as produced by [`crate::power_csv::PowerSweep`].
pub fn find_p1db(pin_dbm: &[f64], pout_dbm: &[f64]) -> P1dbOutcome {
    let n = pin_dbm.len().min(pout_dbm.len());
    if n < 3 {
        return P1dbOutcome::InsufficientLinearRegion { points: n };
    }

    let span = pin_dbm[n - 1] - pin_dbm[0];
    let linear_edge = pin_dbm[0] + span * LINEAR_REGION_FRACTION;
    let linear: Vec<usize> = (0..n).filter(|&i| pin_dbm[i] <= linear_edge).collect();
    if linear.len() < 3 {
        return P1dbOutcome::InsufficientLinearRegion {
            points: linear.len(),
        };
    }

    // Unit-slope least-squares fit: Pout = Pin + G.
    let gain_db =
        linear.iter().map(|&i| pout_dbm[i] - pin_dbm[i]).sum::<f64>() / linear.len() as f64;

    let deviation = |i: usize| (pin_dbm[i] + gain_db) - pout_dbm[i];
    let mut max_deviation_db = f64::NEG_INFINITY;
    for i in 0..n {
        let dev = deviation(i);
        max_deviation_db = max_deviation_db.max(dev);
        if dev >= COMPRESSION_DB {
            if i == 0 {
                return P1dbOutcome::Found(P1dbResult {
                    input_dbm: pin_dbm[0],
                    output_dbm: pout_dbm[0],
                    small_signal_gain_db: gain_db,
                });
            }
            let prev = deviation(i - 1);
            let t = (COMPRESSION_DB - prev) / (dev - prev);
            let input_dbm = pin_dbm[i - 1] + t * (pin_dbm[i] - pin_dbm[i - 1]);
            let output_dbm = pout_dbm[i - 1] + t * (pout_dbm[i] - pout_dbm[i - 1]);
            return P1dbOutcome::Found(P1dbResult {
                input_dbm,
                output_dbm,
                small_signal_gain_db: gain_db,
            });
        }
    }
    P1dbOutcome::NoCompression { max_deviation_db }
}

/// IM3 suppression of one two-tone record, dBc: the weaker fundamental
/// (markers 1/2) minus the stronger IM3 product (markers 3/4). `None` for
/// single-tone records.
pub fn im3_dbc(record: &PowerLinearityRecord) -> Option<f64> {
    if record.mode != ToneMode::TwoTone {
        return None;
    }
    let m = &record.markers_dbm;
    Some(m[0].min(m[1]) - m[2].max(m[3]))
}

/// IM5 suppression of one two-tone record, dBc, from markers 5/6.
pub fn im5_dbc(record: &PowerLinearityRecord) -> Option<f64> {
    if record.mode != ToneMode::TwoTone {
        return None;
    }
    let m = &record.markers_dbm;
    Some(m[0].min(m[1]) - m[4].max(m[5]))
}

/// Per-input-power intermodulation suppression of a two-tone sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearityCurve {
    /// Input powers, dBm, ascending.
    pub pin_dbm: Vec<f64>,
    /// IM3 suppression per point, dBc.
    pub im3_dbc: Vec<f64>,
    /// IM5 suppression per point, dBc.
    pub im5_dbc: Vec<f64>,
}

/// Build the linearity curve of a two-tone sweep. `None` for single-tone
/// sweeps, which carry no intermodulation markers worth reading.
pub fn linearity_curve(sweep: &PowerSweep) -> Option<LinearityCurve> {
    if sweep.mode != ToneMode::TwoTone || sweep.is_empty() {
        return None;
    }
    let mut curve = LinearityCurve {
        pin_dbm: Vec::with_capacity(sweep.len()),
        im3_dbc: Vec::with_capacity(sweep.len()),
        im5_dbc: Vec::with_capacity(sweep.len()),
    };
    for record in &sweep.records {
        curve.pin_dbm.push(record.pin_dbm);
        // Mode already checked at sweep level.
        curve.im3_dbc.push(im3_dbc(record).unwrap_or(0.0));
        curve.im5_dbc.push(im5_dbc(record).unwrap_or(0.0));
    }
    Some(curve)
}

/// Linear interpolation of `values` at `target` over ascending `pin`.
/// Extrapolates from the end segments outside the sweep range. `None` when
/// fewer than 2 points are available or the lengths differ.
pub fn interpolate_at(pin: &[f64], values: &[f64], target: f64) -> Option<f64> {
    if pin.len() != values.len() || pin.len() < 2 {
        return None;
    }
    for window in 0..pin.len() - 1 {
        let (x0, x1) = (pin[window], pin[window + 1]);
        if x0 <= target && target <= x1 {
            if x1 == x0 {
                return Some(values[window]);
            }
            let t = (target - x0) / (x1 - x0);
            return Some(values[window] + t * (values[window + 1] - values[window]));
        }
    }
    let (x0, x1, y0, y1) = if target < pin[0] {
        (pin[0], pin[1], values[0], values[1])
    } else {
        let n = pin.len();
        (pin[n - 2], pin[n - 1], values[n - 2], values[n - 1])
    };
    let t = (target - x0) / (x1 - x0);
    Some(y0 + t * (y1 - y0))
}
