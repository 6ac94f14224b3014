//! Evaluation run orchestration
//!
//! One run takes a batch of user-selected measurement files, the active
//! [`DutConfig`] and a [`TestStage`], and produces a [`RunResult`]: one
//! report per enabled test kind, plus every warning and per-file error
//! collected along the way. Nothing is thrown past the run boundary:
//! a malformed file costs exactly that file, and a missing requirement
//! section costs exactly that test kind.
//!
//! The run splits into two phases. [`EvaluationRun::analyze`] parses and
//! derives everything stage-independent; [`EvaluationRun::evaluate`] pairs
//! derived values with the active stage's bounds. Switching stages is a
//! second `evaluate` call on the same [`Analysis`]: no re-parsing, no
//! re-analysis.
//!
//! Configuration is read-only for the duration of a run. A caller that
//! wants to reconfigure either waits or abandons the run via its
//! [`CancelToken`]; results already computed stay valid.
//!
//! With the `parallel` feature, file parsing fans out per file via rayon.
//! That is an optional acceleration only; results are identical either way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::dut_config::{ConfigError, DutConfig, SParamRequirements, TestKind, TestStage};
use crate::error::{ParseError, Warning};
use crate::evaluator::{aggregate, evaluate, Bound, EvaluatorOptions, Status, Verdict};
use crate::metrics::{GridOffset, Metric, MetricKind, Provenance};
use crate::nf_csv::{self, NfColumnMap, NfTrace};
use crate::noise_analysis::worst_case_nf;
use crate::power_analysis::{find_p1db, interpolate_at, linearity_curve, P1dbOutcome};
use crate::power_csv::{self, PowerLinearityFile, PowerSweep, ToneMode};
use crate::sparam_analysis::{
    gain_stats, nearest_sample, out_of_band_rejection, worst_vswr, Vswr,
};
use crate::touchstone::{self, MeasurementTrace, TouchstoneFile};

/// What a supplied file claims to contain. Touchstone files are also
/// recognizable by extension; the two CSV layouts are not, so the caller
/// tags them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `.s1p`-`.s4p` network data.
    Touchstone,
    /// Power/linearity sweep log.
    PowerLinearity,
    /// Noise-figure trace.
    NoiseFigure,
}

/// One file handed to the engine: name plus full text content.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Filename, used for metadata and provenance.
    pub name: String,
    /// File content.
    pub contents: String,
    /// Declared content kind.
    pub kind: InputKind,
}

impl InputFile {
    /// A Touchstone input.
    pub fn touchstone(name: &str, contents: &str) -> Self {
        Self {
            name: name.to_string(),
            contents: contents.to_string(),
            kind: InputKind::Touchstone,
        }
    }

    /// A power/linearity CSV input.
    pub fn power(name: &str, contents: &str) -> Self {
        Self {
            name: name.to_string(),
            contents: contents.to_string(),
            kind: InputKind::PowerLinearity,
        }
    }

    /// A noise-figure CSV input.
    pub fn noise(name: &str, contents: &str) -> Self {
        Self {
            name: name.to_string(),
            contents: contents.to_string(),
            kind: InputKind::NoiseFigure,
        }
    }
}

/// Run-wide tuning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    /// Column mapping for noise-figure CSVs.
    pub nf_columns: NfColumnMap,
    /// Evaluator knobs (grid tolerance).
    pub evaluator: EvaluatorOptions,
}

/// A fatal error scoped to one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileError {
    /// The file that failed.
    pub file: String,
    /// What went wrong.
    pub error: ParseError,
}

/// Cooperative cancellation flag, checked between file-level operations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Stage-independent product of parsing and trace-level analysis.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Parsed Touchstone files.
    pub sparam_files: Vec<TouchstoneFile>,
    /// Parsed power/linearity files.
    pub power_files: Vec<PowerLinearityFile>,
    /// Parsed noise-figure traces.
    pub nf_traces: Vec<NfTrace>,
    /// All warnings collected during parsing.
    pub warnings: Vec<Warning>,
    /// Per-file fatal errors.
    pub file_errors: Vec<FileError>,
    /// Whether the parse phase stopped early on cancellation.
    pub cancelled: bool,
}

/// Verdicts and aggregate for one test kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TestKindReport {
    /// The test kind.
    pub kind: TestKind,
    /// Aggregate: Pass iff all pass, Fail on any fail, else Indeterminate.
    pub aggregate: Status,
    /// Constituent verdicts.
    pub verdicts: Vec<Verdict>,
}

/// Everything one evaluation run produced.
#[derive(Debug, Default)]
pub struct RunResult {
    /// One report per enabled, configured test kind.
    pub reports: Vec<TestKindReport>,
    /// Warnings from parsing (rows, metadata, structure).
    pub warnings: Vec<Warning>,
    /// Files that failed to parse.
    pub file_errors: Vec<FileError>,
    /// Test kinds rejected for missing requirements.
    pub config_errors: Vec<ConfigError>,
    /// Whether the run was abandoned before completing.
    pub cancelled: bool,
}

impl RunResult {
    /// Report for one test kind, if it was evaluated.
    pub fn report(&self, kind: TestKind) -> Option<&TestKindReport> {
        self.reports.iter().find(|r| r.kind == kind)
    }

    /// All metrics across all reports, in verdict order.
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.reports
            .iter()
            .flat_map(|r| r.verdicts.iter().map(|v| &v.metric))
    }

    /// Whole-run status: Fail on any failing kind; otherwise Indeterminate
    /// when anything was rejected, unreadable or undecided; Pass only when
    /// every evaluated kind passed cleanly.
    pub fn overall(&self) -> Status {
        if self.reports.iter().any(|r| r.aggregate == Status::Fail) {
            return Status::Fail;
        }
        let undecided = self.reports.iter().any(|r| r.aggregate == Status::Indeterminate)
            || !self.config_errors.is_empty()
            || !self.file_errors.is_empty()
            || self.cancelled
            || self.reports.is_empty();
        if undecided {
            Status::Indeterminate
        } else {
            Status::Pass
        }
    }
}

/// One evaluation run over an immutable configuration.
#[derive(Debug)]
pub struct EvaluationRun<'a> {
    config: &'a DutConfig,
    options: RunOptions,
    cancel: CancelToken,
}

impl<'a> EvaluationRun<'a> {
    /// New run against a configuration (read-only for the run's lifetime).
    pub fn new(config: &'a DutConfig) -> Self {
        Self {
            config,
            options: RunOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Override the default options.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Token the caller can use to abandon the run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Parse all files and derive stage-independent data. Per-file failures
    /// land in [`Analysis::file_errors`]; the rest of the batch proceeds.
    pub fn analyze(&self, files: &[InputFile]) -> Analysis {
        let mut analysis = Analysis::default();

        #[cfg(feature = "parallel")]
        let parsed: Vec<Parsed> = {
            if self.cancel.is_cancelled() {
                analysis.cancelled = true;
                Vec::new()
            } else {
                files
                    .par_iter()
                    .map(|f| parse_one(f, &self.options.nf_columns))
                    .collect()
            }
        };

        #[cfg(not(feature = "parallel"))]
        let parsed: Vec<Parsed> = {
            let mut out = Vec::with_capacity(files.len());
            for file in files {
                if self.cancel.is_cancelled() {
                    analysis.cancelled = true;
                    break;
                }
                out.push(parse_one(file, &self.options.nf_columns));
            }
            out
        };

        for item in parsed {
            match item {
                Parsed::Sparam(mut file) => {
                    analysis.warnings.append(&mut file.warnings);
                    analysis.sparam_files.push(file);
                }
                Parsed::Power(mut file) => {
                    analysis.warnings.append(&mut file.warnings);
                    analysis.power_files.push(file);
                }
                Parsed::Noise(mut trace) => {
                    analysis.warnings.append(&mut trace.warnings);
                    analysis.nf_traces.push(trace);
                }
                Parsed::Failed(error) => {
                    tracing::warn!(file = %error.file, error = %error.error, "file rejected");
                    analysis.file_errors.push(error);
                }
            }
        }

        tracing::info!(
            sparam = analysis.sparam_files.len(),
            power = analysis.power_files.len(),
            noise = analysis.nf_traces.len(),
            errors = analysis.file_errors.len(),
            "analysis phase complete"
        );
        analysis
    }

    /// Judge an analysis against one stage's requirement sets. Cheap enough
    /// to call once per stage; nothing is re-parsed.
    pub fn evaluate(&self, analysis: &Analysis, stage: TestStage) -> RunResult {
        let mut result = RunResult {
            warnings: analysis.warnings.clone(),
            file_errors: analysis.file_errors.clone(),
            cancelled: analysis.cancelled,
            ..RunResult::default()
        };

        for &kind in &self.config.enabled_tests {
            match self.config.stage_requirements(stage, kind) {
                Err(error) => {
                    tracing::warn!(%kind, %stage, "test kind rejected: no requirements");
                    result.config_errors.push(error);
                }
                Ok(set) => {
                    // `stage_requirements` only returns Ok when the section
                    // for `kind` is present.
                    let verdicts = match kind {
                        TestKind::SParameters => match &set.sparams {
                            Some(reqs) => self.judge_sparams(analysis, reqs),
                            None => continue,
                        },
                        TestKind::PowerLinearity => match &set.power {
                            Some(reqs) => self.judge_power(analysis, reqs),
                            None => continue,
                        },
                        TestKind::NoiseFigure => match &set.noise {
                            Some(reqs) => self.judge_noise(analysis, reqs.nf_max_db),
                            None => continue,
                        },
                    };
                    result.reports.push(TestKindReport {
                        kind,
                        aggregate: aggregate(&verdicts),
                        verdicts,
                    });
                }
            }
        }

        tracing::info!(%stage, overall = ?result.overall(), "evaluation complete");
        result
    }

    /// Parse, analyze and evaluate in one call.
    pub fn execute(&self, files: &[InputFile], stage: TestStage) -> RunResult {
        let analysis = self.analyze(files);
        self.evaluate(&analysis, stage)
    }

    fn judge_sparams(&self, analysis: &Analysis, reqs: &SParamRequirements) -> Vec<Verdict> {
        let opts = &self.options.evaluator;
        let operational = &self.config.operational_range;
        let mut verdicts = Vec::new();

        for file in &analysis.sparam_files {
            for trace in &file.traces {
                let label = trace_label(trace);
                if trace.name.is_reflection() {
                    let metric = match worst_vswr(trace, operational) {
                        Some(Vswr::Finite(v)) => Metric::scalar(
                            MetricKind::VswrMax,
                            format!("{label} worst VSWR"),
                            v,
                            Provenance::single(&trace.source_file, "band max of (1+|G|)/(1-|G|)"),
                        ),
                        Some(Vswr::Infinite) => Metric::infinite(
                            MetricKind::VswrMax,
                            format!("{label} worst VSWR"),
                            Provenance::single(&trace.source_file, "band max of (1+|G|)/(1-|G|)"),
                        ),
                        None => Metric::indeterminate(
                            MetricKind::VswrMax,
                            format!("{label} worst VSWR"),
                            "no samples in operational band",
                            Provenance::single(&trace.source_file, "band max of (1+|G|)/(1-|G|)"),
                        ),
                    };
                    verdicts.push(evaluate(metric, Bound::Max(reqs.vswr_max), opts));
                    continue;
                }

                if !self.is_configured_path(trace) {
                    continue;
                }

                self.judge_gain(trace, &label, reqs, &mut verdicts);

                for window in &reqs.out_of_band {
                    let metric = match out_of_band_rejection(trace, operational, &window.range) {
                        Some(stats) => Metric::scalar(
                            MetricKind::OutOfBandRejection,
                            format!("{label} rejection {}", window.range),
                            stats.rejection_db,
                            Provenance::single(
                                &trace.source_file,
                                "min in-band gain minus max out-of-band gain",
                            ),
                        ),
                        None => Metric::indeterminate(
                            MetricKind::OutOfBandRejection,
                            format!("{label} rejection {}", window.range),
                            "wideband sweep missing or does not cover window",
                            Provenance::single(&trace.source_file, "wideband gain"),
                        ),
                    };
                    verdicts.push(evaluate(metric, Bound::Min(window.rejection_min_db), opts));
                }
            }
        }
        verdicts
    }

    fn judge_gain(
        &self,
        trace: &MeasurementTrace,
        label: &str,
        reqs: &SParamRequirements,
        verdicts: &mut Vec<Verdict>,
    ) {
        let opts = &self.options.evaluator;
        let operational = &self.config.operational_range;
        let provenance = |method: &str| Provenance::single(&trace.source_file, method);

        // Sub-band bounds replace the global pair when present.
        let bands: Vec<(crate::dut_config::FrequencyRange, f64, f64)> =
            if reqs.gain_bands.is_empty() {
                vec![(*operational, reqs.gain_min_db, reqs.gain_max_db)]
            } else {
                reqs.gain_bands
                    .iter()
                    .map(|b| (b.range, b.gain_min_db, b.gain_max_db))
                    .collect()
            };

        for (band, gain_min, gain_max) in bands {
            match gain_stats(trace, &band) {
                Some(stats) => {
                    verdicts.push(evaluate(
                        Metric::scalar(
                            MetricKind::GainMin,
                            format!("{label} gain min {band}"),
                            stats.min_db,
                            provenance("band minimum of 20 log10 |S|"),
                        ),
                        Bound::Min(gain_min),
                        opts,
                    ));
                    verdicts.push(evaluate(
                        Metric::scalar(
                            MetricKind::GainMax,
                            format!("{label} gain max {band}"),
                            stats.max_db,
                            provenance("band maximum of 20 log10 |S|"),
                        ),
                        Bound::Max(gain_max),
                        opts,
                    ));
                }
                None => {
                    for (kind, bound) in [
                        (MetricKind::GainMin, Bound::Min(gain_min)),
                        (MetricKind::GainMax, Bound::Max(gain_max)),
                    ] {
                        verdicts.push(evaluate(
                            Metric::indeterminate(
                                kind,
                                format!("{label} gain {band}"),
                                "no samples in band",
                                provenance("band gain"),
                            ),
                            bound,
                            opts,
                        ));
                    }
                }
            }
        }

        let flatness = match gain_stats(trace, operational) {
            Some(stats) => Metric::scalar(
                MetricKind::Flatness,
                format!("{label} flatness"),
                stats.flatness_db,
                provenance("max minus min gain over operational band"),
            ),
            None => Metric::indeterminate(
                MetricKind::Flatness,
                format!("{label} flatness"),
                "no samples in operational band",
                provenance("band gain"),
            ),
        };
        verdicts.push(evaluate(flatness, Bound::Max(reqs.flatness_max_db), opts));

        if reqs.spot_gains.is_empty() {
            return;
        }
        let gain = trace.gain_db();
        for spot in &reqs.spot_gains {
            let metric = match nearest_sample(&trace.frequencies_ghz, spot.frequency_ghz) {
                Some(hit) => Metric::scalar(
                    MetricKind::GainAtFrequency,
                    format!("{label} gain @ {:.3} GHz", spot.frequency_ghz),
                    gain[hit.index],
                    provenance("gain at nearest sampled frequency"),
                )
                .with_grid_offset(GridOffset {
                    requested_ghz: spot.frequency_ghz,
                    actual_ghz: hit.frequency_ghz,
                }),
                None => Metric::indeterminate(
                    MetricKind::GainAtFrequency,
                    format!("{label} gain @ {:.3} GHz", spot.frequency_ghz),
                    "empty trace",
                    provenance("gain at nearest sampled frequency"),
                ),
            };
            verdicts.push(evaluate(
                metric,
                Bound::Range {
                    min: spot.gain_min_db,
                    max: spot.gain_max_db,
                },
                opts,
            ));
        }
    }

    fn judge_power(
        &self,
        analysis: &Analysis,
        reqs: &crate::dut_config::PowerRequirements,
    ) -> Vec<Verdict> {
        let opts = &self.options.evaluator;
        let mut verdicts = Vec::new();

        for file in &analysis.power_files {
            let single_tone: Vec<&PowerSweep> = file
                .sweeps
                .iter()
                .filter(|s| s.mode == ToneMode::SingleTone)
                .collect();
            let two_tone: Vec<&PowerSweep> = file
                .sweeps
                .iter()
                .filter(|s| s.mode == ToneMode::TwoTone)
                .collect();

            if single_tone.is_empty() {
                verdicts.push(evaluate(
                    Metric::indeterminate(
                        MetricKind::P1db,
                        "P1dB",
                        "no single-tone sweeps in file",
                        Provenance::single(&file.source_file, "single-tone power sweep"),
                    ),
                    Bound::Min(reqs.p1db_min_dbm),
                    opts,
                ));
            }

            for sweep in &single_tone {
                let label = sweep_label(sweep);
                let provenance = Provenance::single(
                    &file.source_file,
                    "1 dB deviation from unit-slope linear fit",
                );
                let metric = match find_p1db(&sweep.pin_dbm(), &sweep.pout_dbm()) {
                    P1dbOutcome::Found(p1db) => Metric::scalar(
                        MetricKind::P1db,
                        format!("P1dB {label}"),
                        p1db.output_dbm,
                        provenance,
                    ),
                    P1dbOutcome::InsufficientLinearRegion { points } => Metric::indeterminate(
                        MetricKind::P1db,
                        format!("P1dB {label}"),
                        format!("only {points} points in the linear region"),
                        provenance,
                    ),
                    P1dbOutcome::NoCompression { max_deviation_db } => Metric::indeterminate(
                        MetricKind::P1db,
                        format!("P1dB {label}"),
                        format!("sweep never compresses (max deviation {max_deviation_db:.2} dB)"),
                        provenance,
                    ),
                };
                verdicts.push(evaluate(metric, Bound::Min(reqs.p1db_min_dbm), opts));
            }

            for point in &reqs.pin_pout_im3 {
                for sweep in &single_tone {
                    let label = sweep_label(sweep);
                    let metric = match interpolate_at(
                        &sweep.pin_dbm(),
                        &sweep.pout_dbm(),
                        point.pin_dbm,
                    ) {
                        Some(pout) => Metric::scalar(
                            MetricKind::PoutAtPin,
                            format!("Pout @ Pin {} dBm {label}", point.pin_dbm),
                            pout,
                            Provenance::single(&file.source_file, "linear interpolation over sweep"),
                        ),
                        None => Metric::indeterminate(
                            MetricKind::PoutAtPin,
                            format!("Pout @ Pin {} dBm {label}", point.pin_dbm),
                            "sweep has fewer than 2 points",
                            Provenance::single(&file.source_file, "linear interpolation over sweep"),
                        ),
                    };
                    verdicts.push(evaluate(metric, Bound::Min(point.pout_min_dbm), opts));
                }

                for sweep in &two_tone {
                    let label = sweep_label(sweep);
                    let provenance = Provenance::single(
                        &file.source_file,
                        "weaker fundamental minus stronger IM3 marker",
                    );
                    let metric = match linearity_curve(sweep)
                        .and_then(|c| interpolate_at(&c.pin_dbm, &c.im3_dbc, point.pin_dbm))
                    {
                        Some(im3) => Metric::scalar(
                            MetricKind::Im3AtPin,
                            format!("IM3 @ Pin {} dBm {label}", point.pin_dbm),
                            im3,
                            provenance,
                        ),
                        None => Metric::indeterminate(
                            MetricKind::Im3AtPin,
                            format!("IM3 @ Pin {} dBm {label}", point.pin_dbm),
                            "two-tone sweep has fewer than 2 points",
                            provenance,
                        ),
                    };
                    verdicts.push(evaluate(metric, Bound::Min(point.im3_min_dbc), opts));
                }
                if two_tone.is_empty() {
                    verdicts.push(evaluate(
                        Metric::indeterminate(
                            MetricKind::Im3AtPin,
                            format!("IM3 @ Pin {} dBm", point.pin_dbm),
                            "no two-tone sweeps in file",
                            Provenance::single(&file.source_file, "two-tone markers"),
                        ),
                        Bound::Min(point.im3_min_dbc),
                        opts,
                    ));
                }
            }
        }

        if analysis.power_files.is_empty() {
            verdicts.push(evaluate(
                Metric::indeterminate(
                    MetricKind::P1db,
                    "P1dB",
                    "no power/linearity files supplied",
                    Provenance::default(),
                ),
                Bound::Min(reqs.p1db_min_dbm),
                opts,
            ));
        }
        verdicts
    }

    fn judge_noise(&self, analysis: &Analysis, nf_max_db: f64) -> Vec<Verdict> {
        let opts = &self.options.evaluator;
        let band = &self.config.operational_range;
        let metric = match worst_case_nf(&analysis.nf_traces, band) {
            Some(worst) => Metric::scalar(
                MetricKind::WorstCaseNf,
                format!("worst-case NF @ {:.3} GHz", worst.frequency_ghz),
                worst.nf_db,
                Provenance::single(&worst.source_file, "envelope maximum over all traces"),
            ),
            None => Metric::indeterminate(
                MetricKind::WorstCaseNf,
                "worst-case NF",
                "no noise-figure samples in the operational band",
                Provenance::default(),
            ),
        };
        vec![evaluate(metric, Bound::Max(nf_max_db), opts)]
    }

    /// Whether a transmission trace corresponds to a configured
    /// input-to-output path of this DUT.
    fn is_configured_path(&self, trace: &MeasurementTrace) -> bool {
        self.config.output_ports.contains(&trace.name.output_port)
            && self.config.input_ports.contains(&trace.name.input_port)
    }
}

enum Parsed {
    Sparam(TouchstoneFile),
    Power(PowerLinearityFile),
    Noise(NfTrace),
    Failed(FileError),
}

fn parse_one(file: &InputFile, nf_columns: &NfColumnMap) -> Parsed {
    let outcome = match file.kind {
        InputKind::Touchstone => touchstone::parse(&file.name, &file.contents).map(Parsed::Sparam),
        InputKind::PowerLinearity => {
            power_csv::parse(&file.name, &file.contents).map(Parsed::Power)
        }
        InputKind::NoiseFigure => {
            nf_csv::parse(&file.name, &file.contents, nf_columns).map(Parsed::Noise)
        }
    };
    outcome.unwrap_or_else(|error| {
        Parsed::Failed(FileError {
            file: file.name.clone(),
            error,
        })
    })
}

fn trace_label(trace: &MeasurementTrace) -> String {
    match &trace.metadata {
        Some(meta) => format!("{} {}", trace.name, meta.group_key()),
        None => trace.name.to_string(),
    }
}

fn sweep_label(sweep: &PowerSweep) -> String {
    format!("@ {:.2} GHz {}", sweep.frequency_ghz, sweep.chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dut_config::{
        FrequencyRange, NoiseRequirements, OutOfBandRequirement, PinPoutIm3Requirement,
        PowerRequirements, RequirementSet, SParamRequirements,
    };

    fn sparam_reqs(gain_min: f64, gain_max: f64) -> SParamRequirements {
        SParamRequirements {
            gain_min_db: gain_min,
            gain_max_db: gain_max,
            gain_bands: Vec::new(),
            spot_gains: Vec::new(),
            flatness_max_db: 3.0,
            vswr_max: 1.5,
            out_of_band: vec![OutOfBandRequirement {
                range: FrequencyRange::new(0.5, 1.5),
                rejection_min_db: 40.0,
            }],
        }
    }

    fn full_requirements() -> RequirementSet {
        RequirementSet {
            sparams: Some(sparam_reqs(10.0, 20.0)),
            power: Some(PowerRequirements {
                p1db_min_dbm: 5.0,
                pin_pout_im3: vec![PinPoutIm3Requirement {
                    pin_dbm: -25.0,
                    pout_min_dbm: 0.0,
                    im3_min_dbc: 40.0,
                }],
            }),
            noise: Some(NoiseRequirements { nf_max_db: 3.5 }),
        }
    }

    fn config() -> DutConfig {
        DutConfig::new("KA-LNA-01", "L123456")
            .with_operational_range(FrequencyRange::new(2.0, 2.5))
            .with_wideband_range(FrequencyRange::new(0.5, 6.0))
            .with_requirements(TestStage::BoardBringup, full_requirements())
    }

    /// Wideband 2-port sweep: ~15.6 dB in-band S21, deep stopband, |S11|=0.1.
    fn touchstone_content() -> String {
        let mut text = String::from("# GHz S MA R 50\n");
        for freq in [0.5_f64, 1.0, 1.5, 2.0, 2.25, 2.5, 3.0, 4.0, 6.0] {
            let s21 = if (2.0..=2.5).contains(&freq) { 6.0 } else { 0.01 };
            text.push_str(&format!(
                "{freq} 0.1 -170.0 {s21} 85.0 0.01 -20.0 0.1 -30.0\n"
            ));
        }
        text
    }

    /// 30 dB amplifier compressing past -20 dBm input, IM3 markers 45 dBc.
    fn power_content() -> String {
        let mut text = String::from(
            "Serial Number,Temp,Frequency,Chain,Timestamp,Power Level (dBm),Mode,\
             Power Meter (dBm),Thermister Calc (C),Marker 1 (dBm),Marker 2 (dBm),\
             Marker 3 (dBm),Marker 4 (dBm),Marker 5 (dBm),Marker 6 (dBm)\n",
        );
        for freq_mhz in [2100.0, 2300.0, 2500.0] {
            for k in 0..16 {
                let pin = -40.0 + 2.0 * k as f64;
                let dev = if pin > -20.0 { 0.5 * (pin + 20.0) } else { 0.0 };
                let pout = pin + 30.0 - dev;
                text.push_str(&format!(
                    "SN0042,25,{freq_mhz},PRI,2024-01-15 10:30:00,{pin},Single Tone,{pout},25.4,0,0,0,0,0,0\n"
                ));
                text.push_str(&format!(
                    "SN0042,25,{freq_mhz},PRI,2024-01-15 10:30:00,{pin},Two Tone,{pout},25.4,-10,-10,-55,-55,-70,-70\n"
                ));
            }
        }
        text
    }

    fn nf_content() -> &'static str {
        "Frequency,Noise Figure\n2100,2.4\n2300,2.8\n2500,2.6\n"
    }

    fn input_set() -> Vec<InputFile> {
        vec![
            InputFile::touchstone("20240115_L123456_PRI_SN0042.s2p", &touchstone_content()),
            InputFile::power("power_log.csv", &power_content()),
            InputFile::noise("nf_log.csv", nf_content()),
        ]
    }

    #[test]
    fn test_full_run_passes_all_kinds() {
        let config = config();
        let run = EvaluationRun::new(&config);
        let result = run.execute(&input_set(), TestStage::BoardBringup);

        assert!(result.file_errors.is_empty());
        assert!(result.config_errors.is_empty());
        assert_eq!(result.reports.len(), 3);
        for report in &result.reports {
            assert_eq!(
                report.aggregate,
                Status::Pass,
                "{} verdicts: {:?}",
                report.kind,
                report
                    .verdicts
                    .iter()
                    .map(|v| (v.metric.label.clone(), v.status, v.margin))
                    .collect::<Vec<_>>()
            );
        }
        assert_eq!(result.overall(), Status::Pass);
    }

    #[test]
    fn test_missing_requirement_section_rejects_only_that_kind() {
        let mut config = config();
        let set = config
            .requirements
            .get_mut(&TestStage::BoardBringup)
            .unwrap();
        set.noise = None;

        let run = EvaluationRun::new(&config);
        let result = run.execute(&input_set(), TestStage::BoardBringup);

        assert_eq!(result.config_errors.len(), 1);
        assert!(matches!(
            result.config_errors[0],
            ConfigError::MissingRequirements {
                kind: TestKind::NoiseFigure,
                ..
            }
        ));
        assert!(result.report(TestKind::NoiseFigure).is_none());
        // The other kinds still evaluated normally.
        assert_eq!(
            result.report(TestKind::SParameters).unwrap().aggregate,
            Status::Pass
        );
        assert_eq!(
            result.report(TestKind::PowerLinearity).unwrap().aggregate,
            Status::Pass
        );
        assert_eq!(result.overall(), Status::Indeterminate);
    }

    #[test]
    fn test_stage_switch_reuses_analysis() {
        let mut config = config();
        // SIT: tighter gain window the measured ~15.6 dB trace cannot meet.
        let mut sit = full_requirements();
        sit.sparams = Some(sparam_reqs(16.0, 18.0));
        let _ = config.requirements.insert(TestStage::Sit, sit);

        let run = EvaluationRun::new(&config);
        let analysis = run.analyze(&input_set());

        let bringup = run.evaluate(&analysis, TestStage::BoardBringup);
        let sit = run.evaluate(&analysis, TestStage::Sit);

        assert_eq!(
            bringup.report(TestKind::SParameters).unwrap().aggregate,
            Status::Pass
        );
        assert_eq!(
            sit.report(TestKind::SParameters).unwrap().aggregate,
            Status::Fail
        );
        // Tightening bounds never removes failures.
        let bringup_fails = bringup
            .reports
            .iter()
            .flat_map(|r| &r.verdicts)
            .filter(|v| v.status == Status::Fail)
            .count();
        let sit_fails = sit
            .reports
            .iter()
            .flat_map(|r| &r.verdicts)
            .filter(|v| v.status == Status::Fail)
            .count();
        assert!(bringup_fails <= sit_fails);
    }

    #[test]
    fn test_missing_noise_data_is_indeterminate_not_fail() {
        let config = config();
        let run = EvaluationRun::new(&config);
        let files: Vec<InputFile> = input_set()
            .into_iter()
            .filter(|f| f.kind != InputKind::NoiseFigure)
            .collect();
        let result = run.execute(&files, TestStage::BoardBringup);

        let nf_report = result.report(TestKind::NoiseFigure).unwrap();
        assert_eq!(nf_report.aggregate, Status::Indeterminate);
        assert_eq!(result.overall(), Status::Indeterminate);
        // The other kinds are unaffected.
        assert_eq!(
            result.report(TestKind::SParameters).unwrap().aggregate,
            Status::Pass
        );
    }

    #[test]
    fn test_bad_file_isolated_from_batch() {
        let config = config();
        let run = EvaluationRun::new(&config);
        let mut files = input_set();
        files.push(InputFile::touchstone(
            "broken.s2p",
            "# GHz S MA R 50\n2.0 0.1\n",
        ));
        let result = run.execute(&files, TestStage::BoardBringup);

        assert_eq!(result.file_errors.len(), 1);
        assert_eq!(result.file_errors[0].file, "broken.s2p");
        // The good files still produced passing reports.
        assert_eq!(
            result.report(TestKind::SParameters).unwrap().aggregate,
            Status::Pass
        );
    }

    #[test]
    fn test_cancellation_stops_between_files() {
        let config = config();
        let run = EvaluationRun::new(&config);
        run.cancel_token().cancel();
        let analysis = run.analyze(&input_set());
        assert!(analysis.cancelled);
        assert!(analysis.sparam_files.is_empty());
        let result = run.evaluate(&analysis, TestStage::BoardBringup);
        assert!(result.cancelled);
        assert_eq!(result.overall(), Status::Indeterminate);
    }

    #[test]
    fn test_spot_gain_off_grid_is_indeterminate() {
        let mut config = config();
        let set = config
            .requirements
            .get_mut(&TestStage::BoardBringup)
            .unwrap();
        let sparams = set.sparams.as_mut().unwrap();
        // 2.3 GHz is 50 MHz from the nearest sample (2.25), beyond the
        // default 10 MHz grid tolerance.
        sparams.spot_gains.push(crate::dut_config::GainSpot {
            frequency_ghz: 2.3,
            gain_min_db: 10.0,
            gain_max_db: 20.0,
        });

        let run = EvaluationRun::new(&config);
        let result = run.execute(&input_set(), TestStage::BoardBringup);
        let report = result.report(TestKind::SParameters).unwrap();
        let spot = report
            .verdicts
            .iter()
            .find(|v| v.metric.kind == MetricKind::GainAtFrequency)
            .unwrap();
        assert_eq!(spot.status, Status::Indeterminate);
        assert_eq!(report.aggregate, Status::Indeterminate);

        // On-grid spot frequency evaluates normally.
        let mut config = config;
        let sparams = config
            .requirements
            .get_mut(&TestStage::BoardBringup)
            .unwrap()
            .sparams
            .as_mut()
            .unwrap();
        sparams.spot_gains[0].frequency_ghz = 2.25;
        let run = EvaluationRun::new(&config);
        let result = run.execute(&input_set(), TestStage::BoardBringup);
        let spot = result
            .report(TestKind::SParameters)
            .unwrap()
            .verdicts
            .iter()
            .find(|v| v.metric.kind == MetricKind::GainAtFrequency)
            .cloned()
            .unwrap();
        assert_eq!(spot.status, Status::Pass);
        assert!(spot.metric.grid_offset.is_some());
    }

    #[test]
    fn test_gain_sub_bands_replace_global_bounds() {
        let mut config = config();
        let sparams = config
            .requirements
            .get_mut(&TestStage::BoardBringup)
            .unwrap()
            .sparams
            .as_mut()
            .unwrap();
        // Global bounds would pass; the upper sub-band demands gain the
        // ~15.6 dB trace cannot deliver.
        sparams.gain_bands = vec![
            crate::dut_config::GainBand {
                range: FrequencyRange::new(2.0, 2.25),
                gain_min_db: 10.0,
                gain_max_db: 20.0,
            },
            crate::dut_config::GainBand {
                range: FrequencyRange::new(2.25, 2.5),
                gain_min_db: 17.0,
                gain_max_db: 20.0,
            },
        ];

        let run = EvaluationRun::new(&config);
        let result = run.execute(&input_set(), TestStage::BoardBringup);
        let report = result.report(TestKind::SParameters).unwrap();
        assert_eq!(report.aggregate, Status::Fail);
        let failing: Vec<&Verdict> = report
            .verdicts
            .iter()
            .filter(|v| v.status == Status::Fail)
            .collect();
        assert_eq!(failing.len(), 1);
        assert_eq!(failing[0].metric.kind, MetricKind::GainMin);
        assert!(failing[0].metric.label.contains("2.250-2.500"));
    }

    #[test]
    fn test_metrics_iterator_and_provenance() {
        let config = config();
        let run = EvaluationRun::new(&config);
        let result = run.execute(&input_set(), TestStage::BoardBringup);
        let metrics: Vec<&Metric> = result.metrics().collect();
        assert!(!metrics.is_empty());
        // Every determinate metric names at least one source file.
        for metric in metrics {
            if !metric.is_indeterminate() {
                assert!(
                    !metric.provenance.sources.is_empty(),
                    "metric '{}' has no provenance",
                    metric.label
                );
            }
        }
    }
}
