//! S-parameter trace analysis
//!
//! Pure functions deriving gain, flatness, VSWR and out-of-band rejection
//! from parsed traces. Everything operates on the trace's native sample
//! grid; no interpolation or resampling anywhere. Band restriction keeps
//! samples with `f` inside the configured range (inclusive) and drops the
//! rest, which is exactly how an "operational" check differs from a
//! "wideband" one.
//!
//! Requirement frequencies that fall between samples are answered at the
//! nearest sampled frequency, with the substitution distance reported via
//! [`NearestSample`] so the caller can decide whether it is tolerable.

use crate::dut_config::FrequencyRange;
use crate::touchstone::MeasurementTrace;

/// Gain statistics over one frequency band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStats {
    /// Minimum gain in the band, dB.
    pub min_db: f64,
    /// Maximum gain in the band, dB.
    pub max_db: f64,
    /// Flatness: max - min, dB.
    pub flatness_db: f64,
    /// Frequency of the minimum, GHz.
    pub min_at_ghz: f64,
    /// Frequency of the maximum, GHz.
    pub max_at_ghz: f64,
}

/// Gain statistics for a trace restricted to `band`. `None` when no sample
/// falls inside the band (Indeterminate upstream).
pub fn gain_stats(trace: &MeasurementTrace, band: &FrequencyRange) -> Option<GainStats> {
    let gain = trace.gain_db();
    let mut stats: Option<GainStats> = None;
    for (&freq, &g) in trace.frequencies_ghz.iter().zip(&gain) {
        if !band.contains(freq) {
            continue;
        }
        match &mut stats {
            None => {
                stats = Some(GainStats {
                    min_db: g,
                    max_db: g,
                    flatness_db: 0.0,
                    min_at_ghz: freq,
                    max_at_ghz: freq,
                });
            }
            Some(s) => {
                if g < s.min_db {
                    s.min_db = g;
                    s.min_at_ghz = freq;
                }
                if g > s.max_db {
                    s.max_db = g;
                    s.max_at_ghz = freq;
                }
            }
        }
    }
    stats.map(|mut s| {
        s.flatness_db = s.max_db - s.min_db;
        s
    })
}

/// Voltage standing wave ratio. Total reflection (|Γ| >= 1) is the explicit
/// `Infinite` sentinel, never a float overflow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Vswr {
    /// Ordinary finite ratio, >= 1.
    Finite(f64),
    /// Open/short: |Γ| >= 1.
    Infinite,
}

impl Vswr {
    /// The finite ratio, if there is one.
    pub fn finite(self) -> Option<f64> {
        match self {
            Vswr::Finite(v) => Some(v),
            Vswr::Infinite => None,
        }
    }

    /// Whether this is the infinite sentinel.
    pub fn is_infinite(self) -> bool {
        matches!(self, Vswr::Infinite)
    }

    /// The worse (larger) of two ratios; `Infinite` dominates.
    pub fn worse(self, other: Self) -> Self {
        match (self, other) {
            (Vswr::Infinite, _) | (_, Vswr::Infinite) => Vswr::Infinite,
            (Vswr::Finite(a), Vswr::Finite(b)) => Vswr::Finite(a.max(b)),
        }
    }
}

/// VSWR from a reflection coefficient magnitude: (1 + |Γ|) / (1 - |Γ|).
pub fn vswr_from_reflection(gamma_mag: f64) -> Vswr {
    if gamma_mag >= 1.0 {
        Vswr::Infinite
    } else {
        Vswr::Finite((1.0 + gamma_mag) / (1.0 - gamma_mag))
    }
}

/// Per-sample VSWR of a reflection trace (S11, S22, ...).
pub fn vswr_curve(trace: &MeasurementTrace) -> Vec<Vswr> {
    trace
        .values
        .iter()
        .map(|s| vswr_from_reflection(s.norm()))
        .collect()
}

/// Worst VSWR of a reflection trace restricted to `band`. `None` when no
/// sample falls inside the band.
pub fn worst_vswr(trace: &MeasurementTrace, band: &FrequencyRange) -> Option<Vswr> {
    let mut worst: Option<Vswr> = None;
    for (&freq, value) in trace.frequencies_ghz.iter().zip(&trace.values) {
        if !band.contains(freq) {
            continue;
        }
        let v = vswr_from_reflection(value.norm());
        worst = Some(match worst {
            None => v,
            Some(w) => w.worse(v),
        });
    }
    worst
}

/// Out-of-band rejection derived from a wideband gain trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RejectionStats {
    /// Rejection: worst-case operational gain minus worst-case out-of-band
    /// gain, dB. Larger is better.
    pub rejection_db: f64,
    /// Lowest gain found in the operational band, dB.
    pub worst_operational_db: f64,
    /// Highest gain found in the out-of-band window, dB.
    pub worst_oob_db: f64,
}

/// Rejection over one out-of-band window. Needs samples in both the
/// operational band and the window; `None` otherwise (the wideband sweep is
/// missing or does not cover the window), which is Indeterminate for this
/// metric only.
pub fn out_of_band_rejection(
    trace: &MeasurementTrace,
    operational: &FrequencyRange,
    window: &FrequencyRange,
) -> Option<RejectionStats> {
    let operational_stats = gain_stats(trace, operational)?;
    let window_stats = gain_stats(trace, window)?;
    Some(RejectionStats {
        rejection_db: operational_stats.min_db - window_stats.max_db,
        worst_operational_db: operational_stats.min_db,
        worst_oob_db: window_stats.max_db,
    })
}

/// The sample nearest a requested frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestSample {
    /// Index into the trace's sample arrays.
    pub index: usize,
    /// The sampled frequency, GHz.
    pub frequency_ghz: f64,
    /// |sampled - requested|, GHz.
    pub offset_ghz: f64,
}

/// Locate the sample nearest `target_ghz`. `None` for an empty grid.
pub fn nearest_sample(frequencies_ghz: &[f64], target_ghz: f64) -> Option<NearestSample> {
    let mut best: Option<NearestSample> = None;
    for (index, &freq) in frequencies_ghz.iter().enumerate() {
        let offset = (freq - target_ghz).abs();
        if best.map_or(true, |b| offset < b.offset_ghz) {
            best = Some(NearestSample {
                index,
                frequency_ghz: freq,
                offset_ghz: offset,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touchstone::{DataFormat, MeasurementTrace, SParamName};
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn trace(name: (u8, u8), freqs: &[f64], mags: &[f64]) -> MeasurementTrace {
        MeasurementTrace {
            name: SParamName {
                output_port: name.0,
                input_port: name.1,
            },
            frequencies_ghz: freqs.to_vec(),
            values: mags.iter().map(|&m| Complex64::new(m, 0.0)).collect(),
            format: DataFormat::MagAngle,
            source_file: "t.s2p".to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_gain_stats_excludes_out_of_band_samples() {
        // 10x magnitude = 20 dB in band; 100x = 40 dB outside must not count.
        let t = trace((2, 1), &[1.0, 2.0, 2.5, 3.0], &[100.0, 10.0, 12.0, 100.0]);
        let band = FrequencyRange::new(2.0, 2.5);
        let stats = gain_stats(&t, &band).unwrap();
        assert_relative_eq!(stats.min_db, 20.0, max_relative = 1e-9);
        assert_relative_eq!(stats.max_db, 20.0 * 12.0f64.log10(), max_relative = 1e-9);
        assert_relative_eq!(stats.flatness_db, stats.max_db - stats.min_db);
        assert_relative_eq!(stats.min_at_ghz, 2.0);
        assert_relative_eq!(stats.max_at_ghz, 2.5);
    }

    #[test]
    fn test_gain_stats_empty_band() {
        let t = trace((2, 1), &[1.0, 2.0], &[10.0, 10.0]);
        assert_eq!(gain_stats(&t, &FrequencyRange::new(5.0, 6.0)), None);
    }

    #[test]
    fn test_vswr_monotonic_in_reflection_magnitude() {
        let mut prev = 0.0;
        for k in 0..100 {
            let gamma = k as f64 / 100.0;
            let v = vswr_from_reflection(gamma).finite().unwrap();
            assert!(v >= prev, "VSWR must not decrease: {v} after {prev}");
            prev = v;
        }
    }

    #[test]
    fn test_vswr_known_points() {
        assert_relative_eq!(vswr_from_reflection(0.0).finite().unwrap(), 1.0);
        assert_relative_eq!(vswr_from_reflection(0.5).finite().unwrap(), 3.0);
        assert!(vswr_from_reflection(1.0).is_infinite());
        assert!(vswr_from_reflection(1.2).is_infinite());
    }

    #[test]
    fn test_worst_vswr_infinite_dominates() {
        let t = trace((1, 1), &[1.0, 2.0, 3.0], &[0.1, 1.0, 0.2]);
        let worst = worst_vswr(&t, &FrequencyRange::new(0.5, 3.5)).unwrap();
        assert!(worst.is_infinite());
        // Restricting the band away from the short gives a finite worst case.
        let worst = worst_vswr(&t, &FrequencyRange::new(2.5, 3.5)).unwrap();
        assert_relative_eq!(worst.finite().unwrap(), 1.5, max_relative = 1e-12);
    }

    #[test]
    fn test_out_of_band_rejection() {
        // Operational 2.0-2.5 GHz at ~20 dB, stopband at ~-20 dB.
        let t = trace(
            (2, 1),
            &[1.0, 1.5, 2.0, 2.5, 3.0],
            &[0.1, 0.12, 10.0, 11.0, 0.1],
        );
        let stats = out_of_band_rejection(
            &t,
            &FrequencyRange::new(2.0, 2.5),
            &FrequencyRange::new(1.0, 1.5),
        )
        .unwrap();
        assert_relative_eq!(stats.worst_operational_db, 20.0, max_relative = 1e-9);
        assert_relative_eq!(
            stats.worst_oob_db,
            20.0 * 0.12f64.log10(),
            max_relative = 1e-9
        );
        assert_relative_eq!(
            stats.rejection_db,
            stats.worst_operational_db - stats.worst_oob_db
        );
    }

    #[test]
    fn test_out_of_band_rejection_missing_window_is_none() {
        let t = trace((2, 1), &[2.0, 2.5], &[10.0, 10.0]);
        assert_eq!(
            out_of_band_rejection(
                &t,
                &FrequencyRange::new(2.0, 2.5),
                &FrequencyRange::new(4.0, 5.0),
            ),
            None
        );
    }

    #[test]
    fn test_nearest_sample() {
        let freqs = [2.0, 2.1, 2.2];
        let hit = nearest_sample(&freqs, 2.1).unwrap();
        assert_eq!(hit.index, 1);
        assert_relative_eq!(hit.offset_ghz, 0.0);
        let near = nearest_sample(&freqs, 2.16).unwrap();
        assert_eq!(near.index, 2);
        assert_relative_eq!(near.offset_ghz, 0.04, max_relative = 1e-9);
        assert_eq!(nearest_sample(&[], 1.0), None);
    }
}
