//! Parse error and warning taxonomy
//!
//! Two severities cover everything that can go wrong while reading
//! measurement files:
//!
//! - [`ParseError`]: fatal for the affected file. The file yields no data;
//!   other files in the batch are unaffected.
//! - [`Warning`]: recoverable. A dropped row, a filename that does not match
//!   the naming convention, or a structural oddity. The data that could be
//!   read is still returned.
//!
//! Insufficient data for a *metric* is not an error at all; it is the
//! `Indeterminate` status carried by [`crate::metrics::Metric`] and
//! [`crate::evaluator::Verdict`].

use thiserror::Error;

/// Result type for file parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Fatal, file-scoped parse failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A data row appeared before the `#` option line.
    #[error("data row at line {line} before the '#' option line")]
    MissingOptionLine { line: usize },

    /// The option line declared a data format token other than MA/DB/RI.
    #[error("unrecognized data format token '{token}'")]
    UnknownFormat { token: String },

    /// The option line declared an unknown frequency unit.
    #[error("unrecognized frequency unit '{token}'")]
    UnknownFrequencyUnit { token: String },

    /// The option line declared a parameter type this engine does not read.
    #[error("unsupported parameter type '{token}', only S-parameters are accepted")]
    UnsupportedParameter { token: String },

    /// A data row carried fewer fields than the declared format requires.
    #[error("data row at line {line} has {got} fields, expected {expected}")]
    ColumnCount {
        line: usize,
        expected: usize,
        got: usize,
    },

    /// The port count implied by the file extension disagrees with the data
    /// columns actually present.
    #[error("extension implies {expected} port(s) but data rows match a {got}-port layout")]
    PortCountMismatch { expected: usize, got: usize },

    /// Frequencies must be strictly increasing within one file; duplicates
    /// and decreasing steps are both rejected.
    #[error("frequency not strictly increasing at line {line}: {prev} GHz then {next} GHz")]
    NonIncreasingFrequency { line: usize, prev: f64, next: f64 },

    /// A numeric field in a fatal context failed to parse.
    #[error("invalid number '{value}' at line {line}")]
    InvalidNumber { line: usize, value: String },

    /// A required CSV column is absent from the header row.
    #[error("missing required column '{column}'")]
    MissingColumn { column: String },

    /// The file has a header but no data rows, or no content at all.
    #[error("no data rows found")]
    Empty,

    /// The filename does not end in `.s1p`-`.s4p`, so the expected port
    /// count cannot be determined.
    #[error("'{filename}' has no recognized .s1p-.s4p extension")]
    UnknownExtension { filename: String },
}

/// Recoverable issues surfaced alongside parsed data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Warning {
    /// A single malformed CSV row was dropped.
    #[error("{file}:{line}: row dropped: {reason}")]
    Row {
        file: String,
        line: usize,
        reason: String,
    },

    /// The filename does not match the naming convention; identity metadata
    /// is absent but the numeric data was read.
    #[error("{file}: filename does not match naming convention, metadata absent")]
    Metadata { file: String },

    /// The file is structurally unusual (e.g. not exactly 3 distinct sweep
    /// frequencies). Data is still processed.
    #[error("{file}: {reason}")]
    Structure { file: String, reason: String },
}

impl Warning {
    /// Source filename the warning refers to.
    pub fn file(&self) -> &str {
        match self {
            Warning::Row { file, .. }
            | Warning::Metadata { file }
            | Warning::Structure { file, .. } => file,
        }
    }
}
