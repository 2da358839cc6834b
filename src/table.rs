//! Clinical record table
//!
//! One row per patient, keyed by patient id. Columns hold arbitrary clinical
//! attributes; the feature extractor appends its derived columns here.

use crate::error::ComputeError;
use crate::types::PatientId;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Cell text treated as a missing value
const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "#NA",
    "#N/A N/A", "<NA>", "-1.#IND", "-1.#QNAN", "1.#IND", "1.#QNAN",
];

/// Returns true when a raw cell should be treated as missing
pub(crate) fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw.trim())
}

/// A single clinical table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Parse a raw CSV cell: missing markers, then numbers, otherwise text
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_missing(trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_nan() => Cell::Missing,
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Render the cell back to CSV text. NaN is written as an empty field.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Number(v) if v.is_nan() => String::new(),
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Missing => String::new(),
        }
    }
}

/// Clinical records indexed by patient id
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicalTable {
    index_name: String,
    columns: Vec<String>,
    patient_ids: Vec<PatientId>,
    rows: Vec<Vec<Cell>>,
    positions: HashMap<PatientId, usize>,
}

impl ClinicalTable {
    /// Create an empty table with the given index name and attribute columns
    pub fn new(index_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            index_name: index_name.into(),
            columns,
            patient_ids: Vec::new(),
            rows: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Append a patient row. Ids must be unique and the row must match the column count.
    pub fn push_row(&mut self, patient_id: PatientId, cells: Vec<Cell>) -> Result<(), ComputeError> {
        if self.positions.contains_key(&patient_id) {
            return Err(ComputeError::DuplicatePatient(patient_id));
        }
        if cells.len() != self.columns.len() {
            return Err(ComputeError::ShapeMismatch(format!(
                "row for patient {} has {} cells, table has {} columns",
                patient_id,
                cells.len(),
                self.columns.len()
            )));
        }
        self.positions.insert(patient_id, self.rows.len());
        self.patient_ids.push(patient_id);
        self.rows.push(cells);
        Ok(())
    }

    /// Read a clinical table from CSV.
    ///
    /// The index column is `index_column` when given, otherwise the first column.
    pub fn from_reader<R: Read>(reader: R, index_column: Option<&str>) -> Result<Self, ComputeError> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let index_pos = match index_column {
            Some(name) => headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ComputeError::MissingColumn(name.to_string()))?,
            None => {
                if headers.is_empty() {
                    return Err(ComputeError::MissingColumn("index".to_string()));
                }
                0
            }
        };

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index_pos)
            .map(|(_, h)| h.trim().to_string())
            .collect();

        let mut table = Self::new(headers[index_pos].trim(), columns);

        for record in csv_reader.records() {
            let record = record?;
            let patient_id: PatientId = record
                .get(index_pos)
                .ok_or_else(|| ComputeError::MissingColumn(table.index_name.clone()))?
                .parse()?;
            let cells = record
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index_pos)
                .map(|(_, raw)| Cell::parse(raw))
                .collect();
            table.push_row(patient_id, cells)?;
        }

        Ok(table)
    }

    /// Read a clinical table from a CSV file
    pub fn from_path(path: impl AsRef<Path>, index_column: Option<&str>) -> Result<Self, ComputeError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, index_column)
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn patient_ids(&self) -> &[PatientId] {
        &self.patient_ids
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one row, in column order
    pub fn row(&self, patient_id: PatientId) -> Option<&[Cell]> {
        self.positions
            .get(&patient_id)
            .map(|&pos| self.rows[pos].as_slice())
    }

    /// Iterate rows in table order
    pub fn rows(&self) -> impl Iterator<Item = (PatientId, &[Cell])> {
        self.patient_ids
            .iter()
            .copied()
            .zip(self.rows.iter().map(|r| r.as_slice()))
    }

    pub fn cell(&self, patient_id: PatientId, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.row(patient_id).map(|row| &row[col])
    }

    /// Numeric values of a column; non-numeric cells yield `None`
    pub fn numeric_column(&self, column: &str) -> Option<Vec<Option<f64>>> {
        let col = self.column_index(column)?;
        Some(self.rows.iter().map(|row| row[col].as_f64()).collect())
    }

    /// Set a numeric column, overwriting an existing column of the same name
    /// or appending a new one.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), ComputeError> {
        if values.len() != self.rows.len() {
            return Err(ComputeError::ShapeMismatch(format!(
                "column {} has {} values, table has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        match self.column_index(name) {
            Some(col) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[col] = Cell::Number(value);
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(Cell::Number(value));
                }
            }
        }
        Ok(())
    }

    /// Convert to a numeric matrix, one row per patient. Missing cells become NaN.
    pub fn to_matrix(&self) -> Result<Array2<f64>, ComputeError> {
        let mut matrix = Array2::from_elem((self.rows.len(), self.columns.len()), f64::NAN);
        for (mut out, row) in matrix.rows_mut().into_iter().zip(&self.rows) {
            for ((slot, cell), column) in out.iter_mut().zip(row).zip(&self.columns) {
                match cell {
                    Cell::Number(v) => *slot = *v,
                    Cell::Missing => {}
                    Cell::Text(s) => {
                        return Err(ComputeError::NonNumericCell {
                            column: column.clone(),
                            value: s.clone(),
                        })
                    }
                }
            }
        }
        Ok(matrix)
    }
}
