//! Measurement filename metadata
//!
//! S-parameter files follow the documented convention
//! `YYYYMMDD_LXXXXXX_PRI|RED_SNxxxx_HG|LG.sXp`: acquisition date, lot code,
//! signal chain, device serial number and an optional gain variant. Filenames
//! that do not match yield no metadata; the numeric content of the file is
//! still usable, so the caller records a [`crate::error::Warning::Metadata`]
//! instead of failing.
//!
//! CSV filenames carry no reliable convention; power/linearity and
//! noise-figure identity comes from in-file columns only.
//!
//! ## Example
//!
//! ```rust
//! use rfperf_core::file_meta::{FileMetadata, Chain, GainVariant};
//!
//! let meta = FileMetadata::parse("20240115_L123456_PRI_SN0042_HG.s2p").unwrap();
//! assert_eq!(meta.date_code, "20240115");
//! assert_eq!(meta.serial_number, "SN0042");
//! assert_eq!(meta.chain, Chain::Pri);
//! assert_eq!(meta.gain_variant, Some(GainVariant::Hg));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary or redundant signal chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    /// Primary chain.
    Pri,
    /// Redundant chain.
    Red,
}

impl Chain {
    /// Parse a `PRI`/`RED` token (case-insensitive).
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "PRI" => Some(Chain::Pri),
            "RED" => Some(Chain::Red),
            _ => None,
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Chain::Pri => write!(f, "PRI"),
            Chain::Red => write!(f, "RED"),
        }
    }
}

/// High-gain or low-gain device variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GainVariant {
    /// High gain.
    Hg,
    /// Low gain.
    Lg,
}

impl GainVariant {
    /// Parse an `HG`/`LG` token (case-insensitive).
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "HG" => Some(GainVariant::Hg),
            "LG" => Some(GainVariant::Lg),
            _ => None,
        }
    }
}

impl std::fmt::Display for GainVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GainVariant::Hg => write!(f, "HG"),
            GainVariant::Lg => write!(f, "LG"),
        }
    }
}

/// Identity fields extracted from a conforming filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Acquisition date, `YYYYMMDD`.
    pub date_code: String,
    /// Lot code, `L` followed by 4-6 digits.
    pub lot_code: String,
    /// Device serial number, `SN` followed by digits.
    pub serial_number: String,
    /// Signal chain.
    pub chain: Chain,
    /// Gain variant, present only for HG/LG devices.
    pub gain_variant: Option<GainVariant>,
}

impl FileMetadata {
    /// Parse a filename against the naming convention. Returns `None` for
    /// non-conforming names; the caller decides whether that is a warning.
    ///
    /// Tokens may appear in any order between underscores; date, lot, serial
    /// and chain are all required, the gain variant is optional.
    pub fn parse(filename: &str) -> Option<Self> {
        let base = basename(filename);
        let stem = base.rsplit_once('.').map_or(base, |(s, _)| s);

        let mut date_code = None;
        let mut lot_code = None;
        let mut serial_number = None;
        let mut chain = None;
        let mut gain_variant = None;

        for token in stem.split('_') {
            if token.len() == 8 && token.bytes().all(|b| b.is_ascii_digit()) {
                date_code.get_or_insert_with(|| token.to_string());
            } else if is_lot_code(token) {
                lot_code.get_or_insert_with(|| token.to_ascii_uppercase());
            } else if is_serial(token) {
                serial_number.get_or_insert_with(|| token.to_ascii_uppercase());
            } else if let Some(c) = Chain::parse(token) {
                chain.get_or_insert(c);
            } else if let Some(v) = GainVariant::parse(token) {
                gain_variant.get_or_insert(v);
            }
        }

        Some(Self {
            date_code: date_code?,
            lot_code: lot_code?,
            serial_number: serial_number?,
            chain: chain?,
            gain_variant,
        })
    }

    /// Grouping key for a measurement set: `PRI`, `RED_HG`, ...
    pub fn group_key(&self) -> String {
        match self.gain_variant {
            Some(v) => format!("{}_{}", self.chain, v),
            None => self.chain.to_string(),
        }
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn is_lot_code(token: &str) -> bool {
    let t = token.as_bytes();
    matches!(t.first(), Some(b'L' | b'l'))
        && (5..=7).contains(&t.len())
        && t[1..].iter().all(|b| b.is_ascii_digit())
}

fn is_serial(token: &str) -> bool {
    let upper = token.to_ascii_uppercase();
    upper.len() > 2 && upper.starts_with("SN") && upper[2..].bytes().all(|b| b.is_ascii_digit())
}

/// A measurement set that does not cover every required chain/variant
/// combination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileSetError {
    /// No files were supplied.
    #[error("no files selected")]
    Empty,
    /// Wrong number of files for the DUT's variant configuration.
    #[error("expected {expected} files, got {got}")]
    WrongCount { expected: usize, got: usize },
    /// A required chain/variant combination has no file.
    #[error("missing file for {0}")]
    MissingCombination(String),
}

/// Check that a file set covers PRI + RED, and all four PRI/RED x HG/LG
/// combinations when the DUT has gain variants.
pub fn validate_file_set(metadata: &[FileMetadata], hg_lg_enabled: bool) -> Result<(), FileSetError> {
    if metadata.is_empty() {
        return Err(FileSetError::Empty);
    }
    if hg_lg_enabled {
        if metadata.len() != 4 {
            return Err(FileSetError::WrongCount {
                expected: 4,
                got: metadata.len(),
            });
        }
        for chain in [Chain::Pri, Chain::Red] {
            for variant in [GainVariant::Hg, GainVariant::Lg] {
                let found = metadata
                    .iter()
                    .any(|m| m.chain == chain && m.gain_variant == Some(variant));
                if !found {
                    return Err(FileSetError::MissingCombination(format!("{chain} {variant}")));
                }
            }
        }
    } else {
        if metadata.len() != 2 {
            return Err(FileSetError::WrongCount {
                expected: 2,
                got: metadata.len(),
            });
        }
        for chain in [Chain::Pri, Chain::Red] {
            if !metadata.iter().any(|m| m.chain == chain) {
                return Err(FileSetError::MissingCombination(chain.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_convention() {
        let meta = FileMetadata::parse("20231104_L0042_RED_SN1234_LG.s4p").unwrap();
        assert_eq!(meta.date_code, "20231104");
        assert_eq!(meta.lot_code, "L0042");
        assert_eq!(meta.serial_number, "SN1234");
        assert_eq!(meta.chain, Chain::Red);
        assert_eq!(meta.gain_variant, Some(GainVariant::Lg));
        assert_eq!(meta.group_key(), "RED_LG");
    }

    #[test]
    fn test_parse_without_variant() {
        let meta = FileMetadata::parse("20240115_L123456_PRI_SN0042.s2p").unwrap();
        assert_eq!(meta.gain_variant, None);
        assert_eq!(meta.group_key(), "PRI");
    }

    #[test]
    fn test_parse_with_directory_prefix() {
        let meta = FileMetadata::parse("/data/runs/20240115_L1234_PRI_SN7.s1p").unwrap();
        assert_eq!(meta.serial_number, "SN7");
    }

    #[test]
    fn test_parse_case_insensitive_tokens() {
        let meta = FileMetadata::parse("20240115_l1234_pri_sn0042_hg.s2p").unwrap();
        assert_eq!(meta.lot_code, "L1234");
        assert_eq!(meta.serial_number, "SN0042");
        assert_eq!(meta.chain, Chain::Pri);
        assert_eq!(meta.gain_variant, Some(GainVariant::Hg));
    }

    #[test]
    fn test_parse_nonconforming_is_none() {
        assert!(FileMetadata::parse("measurement_final_v2.s2p").is_none());
        assert!(FileMetadata::parse("20240115_L1234_SN0042.s2p").is_none()); // no chain
        assert!(FileMetadata::parse("L1234_PRI_SN0042.s2p").is_none()); // no date
    }

    #[test]
    fn test_file_set_pri_red() {
        let pri = FileMetadata::parse("20240101_L1_PRI_SN1.s2p").unwrap();
        let red = FileMetadata::parse("20240101_L1_RED_SN1.s2p").unwrap();
        assert!(validate_file_set(&[pri.clone(), red], false).is_ok());
        assert_eq!(
            validate_file_set(&[pri], false),
            Err(FileSetError::WrongCount { expected: 2, got: 1 })
        );
    }

    #[test]
    fn test_file_set_hg_lg_missing_combination() {
        let files: Vec<FileMetadata> = [
            "20240101_L1_PRI_SN1_HG.s2p",
            "20240101_L1_PRI_SN1_LG.s2p",
            "20240101_L1_RED_SN1_HG.s2p",
            "20240101_L1_RED_SN1_HG.s2p", // duplicate, LG missing
        ]
        .iter()
        .map(|n| FileMetadata::parse(n).unwrap())
        .collect();
        assert_eq!(
            validate_file_set(&files, true),
            Err(FileSetError::MissingCombination("RED LG".into()))
        );
    }

    #[test]
    fn test_file_set_empty() {
        assert_eq!(validate_file_set(&[], false), Err(FileSetError::Empty));
    }
}
