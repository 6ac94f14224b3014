//! Worst-case noise figure extraction
//!
//! The compliance check cares about the envelope maximum: the highest NF
//! value found at any sampled frequency inside the operational band across
//! *all* parsed traces, not just the single worst trace. The result carries the
//! frequency and source file where the maximum occurred so a failing
//! verdict can be traced back to the measurement.

use crate::dut_config::FrequencyRange;
use crate::nf_csv::NfTrace;

/// Envelope-maximum noise figure with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct WorstCaseNf {
    /// The worst (highest) NF found, dB.
    pub nf_db: f64,
    /// Frequency at which it occurred, GHz.
    pub frequency_ghz: f64,
    /// File the sample came from.
    pub source_file: String,
}

/// Envelope maximum over all traces restricted to `band`. `None` when no
/// trace has a sample inside the band (Indeterminate upstream).
pub fn worst_case_nf(traces: &[NfTrace], band: &FrequencyRange) -> Option<WorstCaseNf> {
    let mut worst: Option<WorstCaseNf> = None;
    for trace in traces {
        for (&freq, &nf) in trace.frequencies_ghz.iter().zip(&trace.nf_db) {
            if !band.contains(freq) {
                continue;
            }
            let beats = worst.as_ref().map_or(true, |w| nf > w.nf_db);
            if beats {
                worst = Some(WorstCaseNf {
                    nf_db: nf,
                    frequency_ghz: freq,
                    source_file: trace.source_file.clone(),
                });
            }
        }
    }
    worst
}
