//! DUT configuration and per-stage requirement sets
//!
//! In-memory model of a device under test: frequency ranges, port topology,
//! which tests are enabled, and the engineering requirements for each test
//! stage. Records are produced and persisted by an external configuration
//! store; the engine treats them as read-only for the duration of an
//! evaluation run.
//!
//! Every enabled test kind must have requirements defined for the active
//! stage. A missing set is a [`ConfigError`], reported and failed closed,
//! never silently skipped.
//!
//! ## Example
//!
//! ```rust
//! use rfperf_core::dut_config::{DutConfig, FrequencyRange, TestStage, TestKind};
//!
//! let config = DutConfig::new("KA-LNA-01", "L123456")
//!     .with_operational_range(FrequencyRange::new(2.0, 2.5))
//!     .with_wideband_range(FrequencyRange::new(0.5, 6.0))
//!     .with_ports(2, vec![1], vec![2]);
//! assert!(config.validate().is_ok());
//! assert!(config.is_enabled(TestKind::SParameters));
//! assert!(config.requirements_for(TestStage::Sit).is_none());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An inclusive frequency band in GHz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    /// Lower edge in GHz.
    pub min_ghz: f64,
    /// Upper edge in GHz.
    pub max_ghz: f64,
}

impl FrequencyRange {
    /// Create a range; edges are not validated here, see [`DutConfig::validate`].
    pub fn new(min_ghz: f64, max_ghz: f64) -> Self {
        Self { min_ghz, max_ghz }
    }

    /// Whether a frequency falls inside the band (inclusive).
    pub fn contains(&self, freq_ghz: f64) -> bool {
        freq_ghz >= self.min_ghz && freq_ghz <= self.max_ghz
    }

    /// Band width in GHz.
    pub fn span_ghz(&self) -> f64 {
        self.max_ghz - self.min_ghz
    }
}

impl std::fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}-{:.3} GHz", self.min_ghz, self.max_ghz)
    }
}

/// Test campaign stage. Requirement sets typically tighten from left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStage {
    /// Board bring-up: first power-on checks, loosest bounds.
    BoardBringup,
    /// System integration test.
    Sit,
    /// Formal test campaign, tightest bounds.
    TestCampaign,
}

impl std::fmt::Display for TestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStage::BoardBringup => write!(f, "Board Bring-up"),
            TestStage::Sit => write!(f, "SIT"),
            TestStage::TestCampaign => write!(f, "Test Campaign"),
        }
    }
}

/// Kind of measurement a DUT can be tested with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Touchstone network data: gain, flatness, VSWR, out-of-band rejection.
    SParameters,
    /// Power sweep logs: compression and intermodulation.
    PowerLinearity,
    /// Noise figure traces.
    NoiseFigure,
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestKind::SParameters => write!(f, "S-parameters"),
            TestKind::PowerLinearity => write!(f, "power/linearity"),
            TestKind::NoiseFigure => write!(f, "noise figure"),
        }
    }
}

/// Gain bounds for one frequency sub-band, overriding the global bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainBand {
    /// Sub-band the bounds apply to.
    pub range: FrequencyRange,
    /// Minimum gain in dB.
    pub gain_min_db: f64,
    /// Maximum gain in dB.
    pub gain_max_db: f64,
}

/// Gain bounds at one nominal spot frequency. Judged at the nearest sampled
/// frequency; the evaluator rejects the substitution when it exceeds the
/// configured grid tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainSpot {
    /// Nominal frequency, GHz.
    pub frequency_ghz: f64,
    /// Minimum gain, dB.
    pub gain_min_db: f64,
    /// Maximum gain, dB.
    pub gain_max_db: f64,
}

/// Required rejection over one out-of-band window (outside the operational
/// band, inside the wideband sweep).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfBandRequirement {
    /// Out-of-band window.
    pub range: FrequencyRange,
    /// Minimum rejection in dB relative to the worst-case operational gain.
    pub rejection_min_db: f64,
}

/// One point of the combined Pin-Pout-IM3 tolerance curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinPoutIm3Requirement {
    /// Input power the point is checked at, dBm.
    pub pin_dbm: f64,
    /// Minimum output power at that input, dBm.
    pub pout_min_dbm: f64,
    /// Minimum IM3 suppression at that input, dBc (larger is cleaner).
    pub im3_min_dbc: f64,
}

/// S-parameter requirements for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SParamRequirements {
    /// Global minimum in-band gain, dB.
    pub gain_min_db: f64,
    /// Global maximum in-band gain, dB.
    pub gain_max_db: f64,
    /// Per-sub-band gain bounds; when non-empty these replace the global
    /// bounds for the sub-bands they cover.
    #[serde(default)]
    pub gain_bands: Vec<GainBand>,
    /// Spot-frequency gain checks.
    #[serde(default)]
    pub spot_gains: Vec<GainSpot>,
    /// Maximum gain flatness (max - min over the band), dB.
    pub flatness_max_db: f64,
    /// Maximum VSWR on reflection ports.
    pub vswr_max: f64,
    /// Out-of-band rejection windows.
    #[serde(default)]
    pub out_of_band: Vec<OutOfBandRequirement>,
}

/// Power/linearity requirements for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerRequirements {
    /// Minimum 1 dB compression point (output-referred), dBm.
    pub p1db_min_dbm: f64,
    /// Pin-Pout-IM3 tolerance curve.
    #[serde(default)]
    pub pin_pout_im3: Vec<PinPoutIm3Requirement>,
}

/// Noise figure requirements for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseRequirements {
    /// Maximum worst-case noise figure over the operational band, dB.
    pub nf_max_db: f64,
}

/// All requirements for one (DUT, stage) pair. A `None` section means the
/// corresponding test kind has no requirements defined at this stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementSet {
    /// S-parameter section.
    pub sparams: Option<SParamRequirements>,
    /// Power/linearity section.
    pub power: Option<PowerRequirements>,
    /// Noise figure section.
    pub noise: Option<NoiseRequirements>,
}

impl RequirementSet {
    /// Whether the section for a test kind is defined.
    pub fn covers(&self, kind: TestKind) -> bool {
        match kind {
            TestKind::SParameters => self.sparams.is_some(),
            TestKind::PowerLinearity => self.power.is_some(),
            TestKind::NoiseFigure => self.noise.is_some(),
        }
    }
}

/// Run-scoped configuration failures. These abort the affected test kind,
/// never the whole run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An enabled test kind has no requirement section for the active stage.
    #[error("no {kind} requirements defined for stage {stage}")]
    MissingRequirements { kind: TestKind, stage: TestStage },

    /// A frequency range has min >= max.
    #[error("invalid frequency range {0}")]
    InvalidRange(FrequencyRange),

    /// Port count outside 1-4, or a port list entry outside the count.
    #[error("invalid port {port} for a {num_ports}-port device")]
    InvalidPort { port: u8, num_ports: u8 },

    /// Port count outside the supported 1-4.
    #[error("unsupported port count {0}, expected 1-4")]
    PortCount(u8),
}

/// Complete device-under-test configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutConfig {
    /// Device type name, the identity key in the external store.
    pub name: String,
    /// Part/lot number prefix expected in measurement filenames.
    pub part_number: String,
    /// Operational frequency band.
    pub operational_range: FrequencyRange,
    /// Full wideband sweep range (superset of operational).
    pub wideband_range: FrequencyRange,
    /// Number of ports, 1-4.
    pub num_ports: u8,
    /// Ports driven as inputs.
    pub input_ports: Vec<u8>,
    /// Ports measured as outputs.
    pub output_ports: Vec<u8>,
    /// Whether the device exists in HG/LG variants (doubles the file set).
    pub hg_lg_enabled: bool,
    /// Tests enabled for this device.
    pub enabled_tests: Vec<TestKind>,
    /// Requirements per test stage.
    #[serde(default)]
    pub requirements: BTreeMap<TestStage, RequirementSet>,
}

impl DutConfig {
    /// New 2-port config with all test kinds enabled and no requirements.
    pub fn new(name: &str, part_number: &str) -> Self {
        Self {
            name: name.to_string(),
            part_number: part_number.to_string(),
            operational_range: FrequencyRange::new(0.0, 0.0),
            wideband_range: FrequencyRange::new(0.0, 0.0),
            num_ports: 2,
            input_ports: vec![1],
            output_ports: vec![2],
            hg_lg_enabled: false,
            enabled_tests: vec![
                TestKind::SParameters,
                TestKind::PowerLinearity,
                TestKind::NoiseFigure,
            ],
            requirements: BTreeMap::new(),
        }
    }

    /// Set the operational band.
    pub fn with_operational_range(mut self, range: FrequencyRange) -> Self {
        self.operational_range = range;
        self
    }

    /// Set the wideband sweep range.
    pub fn with_wideband_range(mut self, range: FrequencyRange) -> Self {
        self.wideband_range = range;
        self
    }

    /// Set the port topology.
    pub fn with_ports(mut self, num_ports: u8, inputs: Vec<u8>, outputs: Vec<u8>) -> Self {
        self.num_ports = num_ports;
        self.input_ports = inputs;
        self.output_ports = outputs;
        self
    }

    /// Set the requirement set for one stage.
    pub fn with_requirements(mut self, stage: TestStage, set: RequirementSet) -> Self {
        let _ = self.requirements.insert(stage, set);
        self
    }

    /// Whether a test kind is enabled for this device.
    pub fn is_enabled(&self, kind: TestKind) -> bool {
        self.enabled_tests.contains(&kind)
    }

    /// Requirement set for a stage, if one is defined.
    pub fn requirements_for(&self, stage: TestStage) -> Option<&RequirementSet> {
        self.requirements.get(&stage)
    }

    /// Fail-closed lookup of one test kind's requirements at one stage.
    pub fn stage_requirements(
        &self,
        stage: TestStage,
        kind: TestKind,
    ) -> Result<&RequirementSet, ConfigError> {
        self.requirements
            .get(&stage)
            .filter(|set| set.covers(kind))
            .ok_or(ConfigError::MissingRequirements { kind, stage })
    }

    /// Structural validation: sane ranges, supported port count, port lists
    /// within the count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for range in [&self.operational_range, &self.wideband_range] {
            if range.min_ghz >= range.max_ghz {
                return Err(ConfigError::InvalidRange(*range));
            }
        }
        if !(1..=4).contains(&self.num_ports) {
            return Err(ConfigError::PortCount(self.num_ports));
        }
        for &port in self.input_ports.iter().chain(&self.output_ports) {
            if port == 0 || port > self.num_ports {
                return Err(ConfigError::InvalidPort {
                    port,
                    num_ports: self.num_ports,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DutConfig {
        DutConfig::new("KA-LNA-01", "L123456")
            .with_operational_range(FrequencyRange::new(2.0, 2.5))
            .with_wideband_range(FrequencyRange::new(0.5, 6.0))
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let config = sample_config().with_operational_range(FrequencyRange::new(2.5, 2.0));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRange(_))));
    }

    #[test]
    fn test_validate_rejects_bad_port() {
        let config = sample_config().with_ports(2, vec![1], vec![3]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPort { port: 3, num_ports: 2 })
        );
        let config = sample_config().with_ports(5, vec![1], vec![2]);
        assert_eq!(config.validate(), Err(ConfigError::PortCount(5)));
    }

    #[test]
    fn test_stage_requirements_fails_closed() {
        let mut config = sample_config();
        let _ = config.requirements.insert(
            TestStage::Sit,
            RequirementSet {
                sparams: Some(SParamRequirements {
                    gain_min_db: 10.0,
                    gain_max_db: 20.0,
                    gain_bands: Vec::new(),
                    spot_gains: Vec::new(),
                    flatness_max_db: 2.0,
                    vswr_max: 1.5,
                    out_of_band: Vec::new(),
                }),
                power: None,
                noise: None,
            },
        );

        assert!(config.stage_requirements(TestStage::Sit, TestKind::SParameters).is_ok());
        // Section absent for the stage.
        assert_eq!(
            config.stage_requirements(TestStage::Sit, TestKind::NoiseFigure),
            Err(ConfigError::MissingRequirements {
                kind: TestKind::NoiseFigure,
                stage: TestStage::Sit,
            })
        );
        // Whole stage absent.
        assert!(config
            .stage_requirements(TestStage::TestCampaign, TestKind::SParameters)
            .is_err());
    }

    #[test]
    fn test_frequency_range_contains() {
        let range = FrequencyRange::new(2.0, 2.5);
        assert!(range.contains(2.0));
        assert!(range.contains(2.5));
        assert!(!range.contains(1.999));
        assert!((range.span_ghz() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_config_json_round_trip() {
        let mut config = sample_config();
        let _ = config.requirements.insert(
            TestStage::BoardBringup,
            RequirementSet {
                sparams: None,
                power: Some(PowerRequirements {
                    p1db_min_dbm: 10.0,
                    pin_pout_im3: vec![PinPoutIm3Requirement {
                        pin_dbm: -20.0,
                        pout_min_dbm: 5.0,
                        im3_min_dbc: 40.0,
                    }],
                }),
                noise: Some(NoiseRequirements { nf_max_db: 3.5 }),
            },
        );
        let json = serde_json::to_string(&config).unwrap();
        let back: DutConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
