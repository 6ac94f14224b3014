//! Touchstone (.s1p-.s4p) network file parser
//!
//! Reads ASCII Touchstone S-parameter files into one [`MeasurementTrace`]
//! per matrix entry (S11, S21, ... for a 2-port). Values are normalized to
//! `Complex64` internally, so downstream consumers can ask for linear
//! magnitude, dB magnitude or phase without re-parsing, whatever format the
//! file declared.
//!
//! The expected port count comes from the file extension (`.s2p` = 2 ports).
//! Frequencies are normalized to GHz and must be strictly increasing; a
//! duplicate or decreasing frequency row is a fatal [`ParseError`], not a
//! merge. Filenames matching the measurement naming convention contribute
//! identity metadata; non-conforming names only cost a warning.
//!
//! ## Example
//!
//! ```rust
//! use rfperf_core::touchstone;
//!
//! let content = "\
//! ! LNA board 3
//! # GHz S MA R 50
//! 2.0  0.05 160.0  10.0 90.0  0.02 -20.0  0.10 -35.0
//! 2.1  0.06 158.0  10.2 88.0  0.02 -21.0  0.11 -36.0
//! ";
//! let file = touchstone::parse("20240115_L1234_PRI_SN0042.s2p", content).unwrap();
//! assert_eq!(file.num_ports, 2);
//! assert_eq!(file.traces.len(), 4);
//! let s21 = file.trace("S21").unwrap();
//! assert_eq!(s21.frequencies_ghz, vec![2.0, 2.1]);
//! ```

use num_complex::Complex64;

use crate::error::{ParseError, ParseResult, Warning};
use crate::file_meta::FileMetadata;

/// Frequency unit declared on the option line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyUnit {
    /// Hertz.
    Hz,
    /// Kilohertz.
    Khz,
    /// Megahertz.
    Mhz,
    /// Gigahertz (Touchstone default).
    Ghz,
}

impl FrequencyUnit {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "HZ" => Some(FrequencyUnit::Hz),
            "KHZ" => Some(FrequencyUnit::Khz),
            "MHZ" => Some(FrequencyUnit::Mhz),
            "GHZ" => Some(FrequencyUnit::Ghz),
            _ => None,
        }
    }

    /// Multiplier taking a file value to GHz.
    pub fn to_ghz(self) -> f64 {
        match self {
            FrequencyUnit::Hz => 1e-9,
            FrequencyUnit::Khz => 1e-6,
            FrequencyUnit::Mhz => 1e-3,
            FrequencyUnit::Ghz => 1.0,
        }
    }
}

/// Data format declared on the option line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Linear magnitude and angle in degrees (`MA`, the default).
    MagAngle,
    /// dB magnitude and angle in degrees (`DB`).
    DbAngle,
    /// Real and imaginary parts (`RI`).
    RealImag,
}

impl DataFormat {
    /// The option-line token for this format.
    pub fn token(self) -> &'static str {
        match self {
            DataFormat::MagAngle => "MA",
            DataFormat::DbAngle => "DB",
            DataFormat::RealImag => "RI",
        }
    }

    fn to_complex(self, a: f64, b: f64) -> Complex64 {
        match self {
            DataFormat::MagAngle => Complex64::from_polar(a, b.to_radians()),
            DataFormat::DbAngle => Complex64::from_polar(10f64.powf(a / 20.0), b.to_radians()),
            DataFormat::RealImag => Complex64::new(a, b),
        }
    }

    fn from_complex(self, value: Complex64) -> (f64, f64) {
        match self {
            DataFormat::MagAngle => (value.norm(), value.arg().to_degrees()),
            DataFormat::DbAngle => (
                20.0 * value.norm().max(1e-300).log10(),
                value.arg().to_degrees(),
            ),
            DataFormat::RealImag => (value.re, value.im),
        }
    }
}

/// S-parameter matrix entry, `S{output}{input}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SParamName {
    /// Measured (output) port.
    pub output_port: u8,
    /// Driven (input) port.
    pub input_port: u8,
}

impl SParamName {
    /// `S11`, `S22`, ... measure reflection; everything else transmission.
    pub fn is_reflection(self) -> bool {
        self.output_port == self.input_port
    }
}

impl std::fmt::Display for SParamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}{}", self.output_port, self.input_port)
    }
}

/// One S-parameter's frequency-ordered samples from one file.
#[derive(Debug, Clone)]
pub struct MeasurementTrace {
    /// Which matrix entry this trace holds.
    pub name: SParamName,
    /// Sample frequencies in GHz, strictly increasing.
    pub frequencies_ghz: Vec<f64>,
    /// Complex S-parameter value per sample.
    pub values: Vec<Complex64>,
    /// Data format the source file declared.
    pub format: DataFormat,
    /// Source filename.
    pub source_file: String,
    /// Identity parsed from the filename, when it conformed.
    pub metadata: Option<FileMetadata>,
}

impl MeasurementTrace {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.frequencies_ghz.len()
    }

    /// Whether the trace holds no samples.
    pub fn is_empty(&self) -> bool {
        self.frequencies_ghz.is_empty()
    }

    /// Linear magnitude per sample.
    pub fn magnitude(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.norm()).collect()
    }

    /// dB magnitude per sample: 20 log10 |S|.
    pub fn gain_db(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|v| 20.0 * v.norm().max(1e-15).log10())
            .collect()
    }

    /// Phase in degrees per sample.
    pub fn phase_deg(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.arg().to_degrees()).collect()
    }
}

/// A fully parsed Touchstone file.
#[derive(Debug, Clone)]
pub struct TouchstoneFile {
    /// Port count implied by the extension and confirmed by the data.
    pub num_ports: usize,
    /// Frequency unit the file declared.
    pub unit: FrequencyUnit,
    /// Data format the file declared.
    pub format: DataFormat,
    /// Reference impedance in ohms.
    pub reference_ohms: f64,
    /// One trace per matrix entry, in file column order.
    pub traces: Vec<MeasurementTrace>,
    /// Recoverable issues found while parsing.
    pub warnings: Vec<Warning>,
}

impl TouchstoneFile {
    /// Look up a trace by name, e.g. `"S21"`.
    pub fn trace(&self, name: &str) -> Option<&MeasurementTrace> {
        self.traces.iter().find(|t| t.name.to_string() == name)
    }

    /// Re-emit the samples in the given format, GHz frequency unit.
    ///
    /// Used by export layers; parsing the output reproduces the samples
    /// within floating-point round-off.
    pub fn serialize(&self, format: DataFormat) -> String {
        let mut out = format!("# GHz S {} R {}\n", format.token(), self.reference_ohms);
        let order = matrix_order(self.num_ports);
        let nfreq = self.traces.first().map_or(0, MeasurementTrace::len);
        for k in 0..nfreq {
            let mut fields = vec![format!("{:.12e}", self.traces[0].frequencies_ghz[k])];
            for (idx, _) in order.iter().enumerate() {
                let (a, b) = format.from_complex(self.traces[idx].values[k]);
                fields.push(format!("{a:.12e}"));
                fields.push(format!("{b:.12e}"));
            }
            out.push_str(&fields.join(" "));
            out.push('\n');
        }
        out
    }
}

/// Port count implied by a `.s1p`-`.s4p` extension (case-insensitive).
pub fn port_count_from_extension(filename: &str) -> Option<usize> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "s1p" => Some(1),
        "s2p" => Some(2),
        "s3p" => Some(3),
        "s4p" => Some(4),
        _ => None,
    }
}

/// Matrix entry order of one data row.
///
/// Touchstone 1-port and 2-port rows are column-major (S11 S21 S12 S22);
/// 3- and 4-port rows are row-major.
fn matrix_order(num_ports: usize) -> Vec<SParamName> {
    if num_ports == 2 {
        return [(1, 1), (2, 1), (1, 2), (2, 2)]
            .iter()
            .map(|&(o, i)| SParamName {
                output_port: o,
                input_port: i,
            })
            .collect();
    }
    let n = num_ports as u8;
    let mut order = Vec::with_capacity(num_ports * num_ports);
    for output_port in 1..=n {
        for input_port in 1..=n {
            order.push(SParamName {
                output_port,
                input_port,
            });
        }
    }
    order
}

/// Parse Touchstone content, deriving the expected port count from the
/// filename's extension.
pub fn parse(filename: &str, content: &str) -> ParseResult<TouchstoneFile> {
    let num_ports = port_count_from_extension(filename).ok_or_else(|| {
        ParseError::UnknownExtension {
            filename: filename.to_string(),
        }
    })?;
    parse_with_ports(filename, content, num_ports)
}

/// Parse Touchstone content with an explicit expected port count.
pub fn parse_with_ports(
    filename: &str,
    content: &str,
    num_ports: usize,
) -> ParseResult<TouchstoneFile> {
    let mut unit = FrequencyUnit::Ghz;
    let mut format = DataFormat::MagAngle;
    let mut reference_ohms = 50.0;
    let mut saw_option_line = false;

    // (line number, numeric fields) for every data line, comments stripped.
    let mut data_lines: Vec<(usize, Vec<f64>)> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('!').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            if saw_option_line {
                // Touchstone permits at most one option line; later ones are
                // ignored the way reference readers ignore them.
                continue;
            }
            parse_option_line(rest, &mut unit, &mut format, &mut reference_ohms, line_no)?;
            saw_option_line = true;
            continue;
        }
        if !saw_option_line {
            return Err(ParseError::MissingOptionLine { line: line_no });
        }
        let mut fields = Vec::new();
        for token in line.split_whitespace() {
            let value = token.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                line: line_no,
                value: token.to_string(),
            })?;
            fields.push(value);
        }
        data_lines.push((line_no, fields));
    }

    if data_lines.is_empty() {
        return Err(ParseError::Empty);
    }

    let rows = assemble_rows(&data_lines, num_ports)?;

    let to_ghz = unit.to_ghz();
    let order = matrix_order(num_ports);
    let mut frequencies_ghz: Vec<f64> = Vec::with_capacity(rows.len());
    let mut columns: Vec<Vec<Complex64>> = vec![Vec::with_capacity(rows.len()); order.len()];

    for (line, row) in &rows {
        let freq_ghz = row[0] * to_ghz;
        if let Some(&prev) = frequencies_ghz.last() {
            if freq_ghz <= prev {
                return Err(ParseError::NonIncreasingFrequency {
                    line: *line,
                    prev,
                    next: freq_ghz,
                });
            }
        }
        frequencies_ghz.push(freq_ghz);
        for (k, column) in columns.iter_mut().enumerate() {
            column.push(format.to_complex(row[1 + 2 * k], row[2 + 2 * k]));
        }
    }

    let mut warnings = Vec::new();
    let metadata = FileMetadata::parse(filename);
    if metadata.is_none() {
        warnings.push(Warning::Metadata {
            file: filename.to_string(),
        });
    }

    let traces = order
        .into_iter()
        .zip(columns)
        .map(|(name, values)| MeasurementTrace {
            name,
            frequencies_ghz: frequencies_ghz.clone(),
            values,
            format,
            source_file: filename.to_string(),
            metadata: metadata.clone(),
        })
        .collect();

    tracing::debug!(
        file = filename,
        ports = num_ports,
        samples = frequencies_ghz.len(),
        "parsed touchstone file"
    );

    Ok(TouchstoneFile {
        num_ports,
        unit,
        format,
        reference_ohms,
        traces,
        warnings,
    })
}

fn parse_option_line(
    rest: &str,
    unit: &mut FrequencyUnit,
    format: &mut DataFormat,
    reference_ohms: &mut f64,
    line: usize,
) -> ParseResult<()> {
    let mut tokens = rest.split_whitespace();
    while let Some(token) = tokens.next() {
        let upper = token.to_ascii_uppercase();
        match upper.as_str() {
            "HZ" | "KHZ" | "MHZ" | "GHZ" => {
                *unit = FrequencyUnit::parse(&upper).ok_or_else(|| {
                    ParseError::UnknownFrequencyUnit {
                        token: token.to_string(),
                    }
                })?;
            }
            "S" => {}
            "Y" | "Z" | "H" | "G" => {
                return Err(ParseError::UnsupportedParameter {
                    token: token.to_string(),
                });
            }
            "MA" => *format = DataFormat::MagAngle,
            "DB" => *format = DataFormat::DbAngle,
            "RI" => *format = DataFormat::RealImag,
            "R" => {
                let value = tokens.next().unwrap_or("");
                *reference_ohms =
                    value.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                        line,
                        value: value.to_string(),
                    })?;
            }
            _ => {
                return Err(ParseError::UnknownFormat {
                    token: token.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Reassemble logical data rows of `1 + 2n^2` values.
///
/// 1- and 2-port files put one row per line; 3- and 4-port files wrap rows
/// over several lines, so those are chunked from the token stream.
fn assemble_rows(
    data_lines: &[(usize, Vec<f64>)],
    num_ports: usize,
) -> ParseResult<Vec<(usize, Vec<f64>)>> {
    let values_per_row = 1 + 2 * num_ports * num_ports;

    if num_ports <= 2 {
        let mut rows = Vec::with_capacity(data_lines.len());
        for (line, fields) in data_lines {
            if fields.len() != values_per_row {
                // A complete row of a different port count means the
                // extension lied about the layout.
                for other in 1..=4usize {
                    if other != num_ports && fields.len() == 1 + 2 * other * other {
                        return Err(ParseError::PortCountMismatch {
                            expected: num_ports,
                            got: other,
                        });
                    }
                }
                return Err(ParseError::ColumnCount {
                    line: *line,
                    expected: values_per_row,
                    got: fields.len(),
                });
            }
            rows.push((*line, fields.clone()));
        }
        return Ok(rows);
    }

    let mut rows = Vec::new();
    let mut pending: Vec<f64> = Vec::with_capacity(values_per_row);
    let mut row_line = 0usize;
    for (line, fields) in data_lines {
        if pending.is_empty() {
            row_line = *line;
        }
        pending.extend_from_slice(fields);
        while pending.len() >= values_per_row {
            let row: Vec<f64> = pending.drain(..values_per_row).collect();
            rows.push((row_line, row));
            row_line = *line;
        }
    }
    if !pending.is_empty() {
        return Err(ParseError::ColumnCount {
            line: row_line,
            expected: values_per_row,
            got: pending.len(),
        });
    }
    Ok(rows)
}
