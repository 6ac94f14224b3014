//! # RF Compliance Evaluation Engine
//!
//! This crate turns raw RF measurement files (Touchstone S-parameter
//! networks and power/linearity CSV logs) into pass/fail compliance
//! verdicts against per-device, per-test-stage engineering requirements.
//!
//! ## Pipeline
//!
//! ```text
//! files → Parsers → Analysis (DutConfig context) → Evaluator (stage bounds) → Verdicts
//! ```
//!
//! - **Parsers** ([`touchstone`], [`power_csv`], [`nf_csv`]) produce typed,
//!   unit-normalized traces and sweep records. A malformed file costs only
//!   that file; a malformed CSV row costs only that row.
//! - **Analysis** ([`sparam_analysis`], [`power_analysis`],
//!   [`noise_analysis`]) derives gain, flatness, VSWR, out-of-band
//!   rejection, P1dB, IM3 and worst-case noise figure on the traces' native
//!   sample grids, with no interpolation or resampling.
//! - **Evaluation** ([`evaluator`], [`run`]) compares derived [`metrics`]
//!   against the active stage's [`dut_config::RequirementSet`] and
//!   aggregates per test kind. `Indeterminate` is a first-class status:
//!   missing data can never masquerade as a pass.
//!
//! Metrics are stage-independent; switching between Board Bring-up, SIT and
//! Test Campaign re-evaluates existing analysis against different bounds
//! without re-parsing anything.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rfperf_core::dut_config::{DutConfig, FrequencyRange, TestStage};
//! use rfperf_core::run::{EvaluationRun, InputFile};
//!
//! let config = DutConfig::new("KA-LNA-01", "L123456")
//!     .with_operational_range(FrequencyRange::new(2.0, 2.5))
//!     .with_wideband_range(FrequencyRange::new(0.5, 6.0));
//!
//! let files = vec![
//!     InputFile::touchstone("20240115_L123456_PRI_SN0042.s2p", "..."),
//!     InputFile::power("power_log.csv", "..."),
//! ];
//!
//! let run = EvaluationRun::new(&config);
//! let result = run.execute(&files, TestStage::BoardBringup);
//! for report in &result.reports {
//!     println!("{}: {:?}", report.kind, report.aggregate);
//! }
//! ```

pub mod dut_config;
pub mod error;
pub mod evaluator;
pub mod file_meta;
pub mod logging;
pub mod metrics;
pub mod nf_csv;
pub mod noise_analysis;
pub mod power_analysis;
pub mod power_csv;
pub mod run;
pub mod sparam_analysis;
pub mod touchstone;

pub use dut_config::{DutConfig, FrequencyRange, RequirementSet, TestKind, TestStage};
pub use error::{ParseError, ParseResult, Warning};
pub use evaluator::{Bound, Status, Verdict};
pub use metrics::{Metric, MetricKind};
pub use run::{EvaluationRun, InputFile, InputKind, RunResult};
