//! # Batch Input and Output
//!
//! Reads observations from a tab-separated file and writes one prediction row per
//! input row. The schema is fixed: `heat_hours`, `may_peak_spores`,
//! `july_peak_spores` and `management` are required, `sample_id` is optional, and
//! any other column is read as an additional named spore count.
//!
//! A malformed file header is fatal. A malformed row is not: it is carried through
//! as a per-row error so the rest of the batch still gets scored.

use crate::assemble::Observation;
use crate::model::{HEAT_HOURS, JULY_PEAK_SPORES, MAY_PEAK_SPORES};
use crate::predictor::{PredictError, Prediction};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

pub const MANAGEMENT_COLUMN: &str = "management";
pub const SAMPLE_ID_COLUMN: &str = "sample_id";

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Error reading or writing tab-separated data: {0}")]
    CsvError(#[from] csv::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("Row {row}: column '{column}' is empty.")]
    MissingValue { row: usize, column: String },
    #[error("Row {row}: column '{column}' contains '{value}', which is not a number.")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },
}

/// One parsed input row.
#[derive(Debug)]
pub struct ObservationRow {
    pub sample_id: String,
    pub observation: Result<Observation, DataError>,
}

/// One output row.
#[derive(Debug)]
pub struct PredictionRow {
    pub sample_id: String,
    pub outcome: Result<Prediction, String>,
}

impl PredictionRow {
    pub fn from_outcome(sample_id: String, outcome: Result<Prediction, PredictError>) -> Self {
        Self {
            sample_id,
            outcome: outcome.map_err(|e| e.to_string()),
        }
    }
}

pub fn load_observations(path: &Path) -> Result<Vec<ObservationRow>, DataError> {
    read_observations(File::open(path)?)
}

/// Parses observations from any reader. Rows are numbered from 1 after the header.
pub fn read_observations<R: Read>(reader: R) -> Result<Vec<ObservationRow>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
    };
    let columns = Columns {
        heat: position(HEAT_HOURS)?,
        may: position(MAY_PEAK_SPORES)?,
        july: position(JULY_PEAK_SPORES)?,
        management: position(MANAGEMENT_COLUMN)?,
        sample_id: headers.iter().position(|h| h == SAMPLE_ID_COLUMN),
        extra_spores: Vec::new(),
    };
    let known = [columns.heat, columns.may, columns.july, columns.management];
    let extra_spores = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !known.contains(i) && Some(*i) != columns.sample_id)
        .map(|(i, h)| (i, h.to_string()))
        .collect();
    let columns = Columns {
        extra_spores,
        ..columns
    };

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let sample_id = columns
            .sample_id
            .and_then(|idx| record.get(idx))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| row.to_string());

        rows.push(ObservationRow {
            sample_id,
            observation: parse_row(&record, row, &columns),
        });
    }
    Ok(rows)
}

/// Column positions resolved from the header.
struct Columns {
    heat: usize,
    may: usize,
    july: usize,
    management: usize,
    sample_id: Option<usize>,
    extra_spores: Vec<(usize, String)>,
}

fn parse_row(
    record: &csv::StringRecord,
    row: usize,
    columns: &Columns,
) -> Result<Observation, DataError> {
    let mut observation = Observation::new(
        parse_number(record, row, columns.heat, HEAT_HOURS)?,
        parse_number(record, row, columns.may, MAY_PEAK_SPORES)?,
        parse_number(record, row, columns.july, JULY_PEAK_SPORES)?,
        field(record, row, columns.management, MANAGEMENT_COLUMN)?,
    );
    for (idx, name) in &columns.extra_spores {
        observation = observation.with_spores(name.clone(), parse_number(record, row, *idx, name)?);
    }
    Ok(observation)
}

fn field<'r>(
    record: &'r csv::StringRecord,
    row: usize,
    idx: usize,
    column: &str,
) -> Result<&'r str, DataError> {
    match record.get(idx) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DataError::MissingValue {
            row,
            column: column.to_string(),
        }),
    }
}

fn parse_number(
    record: &csv::StringRecord,
    row: usize,
    idx: usize,
    column: &str,
) -> Result<f64, DataError> {
    let value = field(record, row, idx, column)?;
    value.parse::<f64>().map_err(|_| DataError::InvalidNumber {
        row,
        column: column.to_string(),
        value: value.to_string(),
    })
}

pub fn save_predictions(path: &Path, rows: &[PredictionRow]) -> Result<(), DataError> {
    write_predictions(File::create(path)?, rows)
}

/// Writes `sample_id, prediction, category, color, error`. Rejected rows leave the
/// prediction columns empty and fill `error`.
pub fn write_predictions<W: Write>(writer: W, rows: &[PredictionRow]) -> Result<(), DataError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    writer.write_record([SAMPLE_ID_COLUMN, "prediction", "category", "color", "error"])?;
    for row in rows {
        match &row.outcome {
            Ok(p) => {
                let value = format!("{:.6}", p.value);
                writer.write_record([
                    row.sample_id.as_str(),
                    value.as_str(),
                    p.category.as_str(),
                    p.color,
                    "",
                ])?
            }
            Err(message) => {
                writer.write_record([row.sample_id.as_str(), "", "", "", message.as_str()])?
            }
        }
    }
    writer.flush()?;
    Ok(())
}
