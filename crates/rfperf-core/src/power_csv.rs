//! Power/linearity CSV log parser
//!
//! Instrument logs arrive as UTF-8, comma-delimited CSV with a header row.
//! Columns are matched by exact, case-sensitive name (never by position),
//! and a missing required column fails the whole file. Individual malformed
//! rows are dropped with a [`Warning::Row`] so partial data survives.
//!
//! A conforming file sweeps input power at exactly 3 distinct frequencies;
//! any other count is a structural warning and the file is flagged
//! incomplete, which downstream turns into `Indeterminate` for
//! completeness-dependent metrics.
//!
//! Records group by (frequency, chain, mode) into one [`PowerSweep`] per
//! group, ordered by ascending input power, ready for P1dB/IM3 extraction.
//! Frequencies are logged in MHz and normalized to GHz here.

use crate::error::{ParseError, ParseResult, Warning};
use crate::file_meta::Chain;

/// Required header columns, exact and case-sensitive.
pub const REQUIRED_COLUMNS: [&str; 15] = [
    "Serial Number",
    "Temp",
    "Frequency",
    "Chain",
    "Timestamp",
    "Power Level (dBm)",
    "Mode",
    "Power Meter (dBm)",
    "Thermister Calc (C)",
    "Marker 1 (dBm)",
    "Marker 2 (dBm)",
    "Marker 3 (dBm)",
    "Marker 4 (dBm)",
    "Marker 5 (dBm)",
    "Marker 6 (dBm)",
];

/// Single-tone or two-tone stimulus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToneMode {
    /// One CW tone; compression data.
    SingleTone,
    /// Two tones; intermodulation data.
    TwoTone,
}

impl ToneMode {
    /// Parse the instrument's `Mode` cell.
    pub fn parse(cell: &str) -> Option<Self> {
        match cell.trim() {
            "Single Tone" => Some(ToneMode::SingleTone),
            "Two Tone" => Some(ToneMode::TwoTone),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToneMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToneMode::SingleTone => write!(f, "single-tone"),
            ToneMode::TwoTone => write!(f, "two-tone"),
        }
    }
}

/// One CSV row: a power measurement at one input level.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerLinearityRecord {
    /// Device serial number as logged.
    pub serial_number: String,
    /// Chamber set-point temperature, C.
    pub temperature_c: f64,
    /// Stimulus frequency, GHz (logged in MHz).
    pub frequency_ghz: f64,
    /// Signal chain under test.
    pub chain: Chain,
    /// Acquisition timestamp as logged.
    pub timestamp: String,
    /// Input power, dBm.
    pub pin_dbm: f64,
    /// Stimulus mode.
    pub mode: ToneMode,
    /// Power-meter output reading, dBm.
    pub pout_dbm: f64,
    /// Thermistor-derived device temperature, C.
    pub thermistor_c: f64,
    /// Spectrum markers 1-6, dBm. 1/2 are the fundamentals, 3/4 the IM3
    /// products, 5/6 the IM5 products.
    pub markers_dbm: [f64; 6],
}

/// Records for one (frequency, chain, mode) group, sorted by input power.
#[derive(Debug, Clone)]
pub struct PowerSweep {
    /// Stimulus frequency, GHz.
    pub frequency_ghz: f64,
    /// Signal chain.
    pub chain: Chain,
    /// Stimulus mode.
    pub mode: ToneMode,
    /// Member records, ascending `pin_dbm`.
    pub records: Vec<PowerLinearityRecord>,
}

impl PowerSweep {
    /// Input power vector, dBm.
    pub fn pin_dbm(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.pin_dbm).collect()
    }

    /// Output power vector, dBm.
    pub fn pout_dbm(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.pout_dbm).collect()
    }

    /// Number of points in the sweep.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the sweep holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A parsed power/linearity file.
#[derive(Debug, Clone)]
pub struct PowerLinearityFile {
    /// Source filename (identity comes from in-file columns, not the name).
    pub source_file: String,
    /// All valid records in file order.
    pub records: Vec<PowerLinearityRecord>,
    /// Records grouped into sweeps, ordered by (frequency, chain, mode).
    pub sweeps: Vec<PowerSweep>,
    /// Distinct sweep frequencies, GHz, ascending.
    pub frequencies_ghz: Vec<f64>,
    /// True when the file holds exactly 3 distinct frequencies.
    pub complete: bool,
    /// Row and structure warnings.
    pub warnings: Vec<Warning>,
}

/// Parse a power/linearity CSV.
pub fn parse(filename: &str, content: &str) -> ParseResult<PowerLinearityFile> {
    let mut lines = content.lines().enumerate();
    let (_, header) = lines
        .by_ref()
        .find(|(_, l)| !l.trim().is_empty())
        .ok_or(ParseError::Empty)?;

    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let mut index = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, name) in REQUIRED_COLUMNS.iter().enumerate() {
        index[slot] = columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ParseError::MissingColumn {
                column: (*name).to_string(),
            })?;
    }

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for (idx, raw) in lines {
        let line_no = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = raw.split(',').map(str::trim).collect();
        match parse_row(&cells, &index) {
            Ok(record) => records.push(record),
            Err(reason) => warnings.push(Warning::Row {
                file: filename.to_string(),
                line: line_no,
                reason,
            }),
        }
    }

    if records.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut frequencies_ghz: Vec<f64> = Vec::new();
    for record in &records {
        if !frequencies_ghz.iter().any(|&f| f == record.frequency_ghz) {
            frequencies_ghz.push(record.frequency_ghz);
        }
    }
    frequencies_ghz.sort_by(|a, b| a.total_cmp(b));

    let complete = frequencies_ghz.len() == 3;
    if !complete {
        warnings.push(Warning::Structure {
            file: filename.to_string(),
            reason: format!(
                "expected 3 distinct sweep frequencies, found {}",
                frequencies_ghz.len()
            ),
        });
    }

    let sweeps = group_sweeps(&records);

    tracing::debug!(
        file = filename,
        records = records.len(),
        sweeps = sweeps.len(),
        complete,
        "parsed power/linearity csv"
    );

    Ok(PowerLinearityFile {
        source_file: filename.to_string(),
        records,
        sweeps,
        frequencies_ghz,
        complete,
        warnings,
    })
}

fn parse_row(cells: &[&str], index: &[usize; 15]) -> Result<PowerLinearityRecord, String> {
    let cell = |slot: usize| -> Result<&str, String> {
        cells
            .get(index[slot])
            .copied()
            .ok_or_else(|| format!("missing field '{}'", REQUIRED_COLUMNS[slot]))
    };
    let number = |slot: usize| -> Result<f64, String> {
        let text = cell(slot)?;
        text.parse::<f64>()
            .map_err(|_| format!("non-numeric {} '{text}'", REQUIRED_COLUMNS[slot]))
    };

    let chain_cell = cell(3)?;
    let chain = Chain::parse(chain_cell).ok_or_else(|| format!("unknown chain '{chain_cell}'"))?;
    let mode_cell = cell(6)?;
    let mode = ToneMode::parse(mode_cell).ok_or_else(|| format!("unknown mode '{mode_cell}'"))?;

    let mut markers_dbm = [0.0; 6];
    for (k, marker) in markers_dbm.iter_mut().enumerate() {
        *marker = number(9 + k)?;
    }

    Ok(PowerLinearityRecord {
        serial_number: cell(0)?.to_string(),
        temperature_c: number(1)?,
        frequency_ghz: number(2)? / 1000.0,
        chain,
        timestamp: cell(4)?.to_string(),
        pin_dbm: number(5)?,
        mode,
        pout_dbm: number(7)?,
        thermistor_c: number(8)?,
        markers_dbm,
    })
}

fn group_sweeps(records: &[PowerLinearityRecord]) -> Vec<PowerSweep> {
    let mut sweeps: Vec<PowerSweep> = Vec::new();
    for record in records {
        let found = sweeps.iter_mut().find(|s| {
            s.frequency_ghz == record.frequency_ghz
                && s.chain == record.chain
                && s.mode == record.mode
        });
        match found {
            Some(sweep) => sweep.records.push(record.clone()),
            None => sweeps.push(PowerSweep {
                frequency_ghz: record.frequency_ghz,
                chain: record.chain,
                mode: record.mode,
                records: vec![record.clone()],
            }),
        }
    }
    for sweep in &mut sweeps {
        sweep.records.sort_by(|a, b| a.pin_dbm.total_cmp(&b.pin_dbm));
    }
    sweeps.sort_by(|a, b| {
        a.frequency_ghz
            .total_cmp(&b.frequency_ghz)
            .then_with(|| a.chain.to_string().cmp(&b.chain.to_string()))
            .then_with(|| (a.mode == ToneMode::TwoTone).cmp(&(b.mode == ToneMode::TwoTone)))
    });
    sweeps
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HEADER: &str = "Serial Number,Temp,Frequency,Chain,Timestamp,Power Level (dBm),Mode,Power Meter (dBm),Thermister Calc (C),Marker 1 (dBm),Marker 2 (dBm),Marker 3 (dBm),Marker 4 (dBm),Marker 5 (dBm),Marker 6 (dBm)";

    fn row(freq_mhz: f64, chain: &str, pin: f64, mode: &str, pout: f64) -> String {
        format!(
            "SN0042,25,{freq_mhz},{chain},2024-01-15 10:30:00,{pin},{mode},{pout},25.4,-10,-10.2,-55,-54,-70,-71"
        )
    }

    fn sample_file() -> String {
        let mut text = String::from(HEADER);
        text.push('\n');
        for freq in [2100.0, 2300.0, 2500.0] {
            for pin in [-30.0, -25.0, -20.0] {
                text.push_str(&row(freq, "PRI", pin, "Single Tone", pin + 30.0));
                text.push('\n');
                text.push_str(&row(freq, "PRI", pin, "Two Tone", pin + 29.0));
                text.push('\n');
            }
        }
        text
    }

    #[test]
    fn test_parse_groups_sweeps() {
        let file = parse("power.csv", &sample_file()).unwrap();
        assert_eq!(file.records.len(), 18);
        assert_eq!(file.sweeps.len(), 6); // 3 freqs x {single, two}
        assert!(file.complete);
        assert!(file.warnings.is_empty());
        assert_eq!(file.frequencies_ghz, vec![2.1, 2.3, 2.5]);

        let sweep = &file.sweeps[0];
        assert_relative_eq!(sweep.frequency_ghz, 2.1, max_relative = 1e-12);
        assert_eq!(sweep.mode, ToneMode::SingleTone);
        assert_eq!(sweep.pin_dbm(), vec![-30.0, -25.0, -20.0]);
    }

    #[test]
    fn test_sweeps_sorted_by_ascending_pin() {
        let mut text = String::from(HEADER);
        text.push('\n');
        // Out of order input powers.
        for pin in [-20.0, -30.0, -25.0] {
            text.push_str(&row(2100.0, "PRI", pin, "Single Tone", pin + 30.0));
            text.push('\n');
        }
        let file = parse("power.csv", &text).unwrap();
        assert_eq!(file.sweeps[0].pin_dbm(), vec![-30.0, -25.0, -20.0]);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let text = "Serial Number,Temp,Frequency\nSN1,25,2100\n";
        assert_eq!(
            parse("power.csv", text).unwrap_err(),
            ParseError::MissingColumn {
                column: "Chain".to_string(),
            }
        );
    }

    #[test]
    fn test_malformed_row_drops_with_one_warning() {
        let mut text = sample_file();
        text.push_str("SN0042,25,not-a-number,PRI,ts,-30,Single Tone,0,25,-1,-1,-1,-1,-1,-1\n");
        let file = parse("power.csv", &text).unwrap();
        assert_eq!(file.records.len(), 18); // bad row dropped
        let row_warnings: Vec<_> = file
            .warnings
            .iter()
            .filter(|w| matches!(w, Warning::Row { .. }))
            .collect();
        assert_eq!(row_warnings.len(), 1);
        assert!(row_warnings[0].to_string().contains("Frequency"));
    }

    #[test]
    fn test_wrong_frequency_count_flags_incomplete() {
        let mut text = String::from(HEADER);
        text.push('\n');
        for freq in [2100.0, 2300.0] {
            text.push_str(&row(freq, "PRI", -30.0, "Single Tone", 0.0));
            text.push('\n');
        }
        let file = parse("power.csv", &text).unwrap();
        assert!(!file.complete);
        assert!(file
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::Structure { .. })));
        // Data is still processed.
        assert_eq!(file.records.len(), 2);
    }

    #[test]
    fn test_columns_found_by_name_not_position() {
        // Shuffled column order relative to REQUIRED_COLUMNS.
        let text = "Mode,Frequency,Serial Number,Chain,Temp,Timestamp,Power Meter (dBm),Power Level (dBm),Thermister Calc (C),Marker 2 (dBm),Marker 1 (dBm),Marker 3 (dBm),Marker 4 (dBm),Marker 5 (dBm),Marker 6 (dBm)\n\
                    Two Tone,2100,SN7,RED,25,ts,1.5,-30,25.1,-10.2,-10,-55,-54,-70,-71\n";
        let file = parse("power.csv", text).unwrap();
        let record = &file.records[0];
        assert_eq!(record.serial_number, "SN7");
        assert_eq!(record.chain, Chain::Red);
        assert_eq!(record.mode, ToneMode::TwoTone);
        assert_relative_eq!(record.pin_dbm, -30.0);
        assert_relative_eq!(record.pout_dbm, 1.5);
        assert_relative_eq!(record.markers_dbm[0], -10.0);
        assert_relative_eq!(record.markers_dbm[1], -10.2);
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(parse("p.csv", "").unwrap_err(), ParseError::Empty);
        assert_eq!(parse("p.csv", HEADER).unwrap_err(), ParseError::Empty);
    }
}
