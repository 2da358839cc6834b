//! Error types for CGM feature extraction

use crate::types::PatientId;
use thiserror::Error;

/// Errors that can occur while loading CGM data or computing features
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Duplicate patient id in clinical table: {0}")]
    DuplicatePatient(PatientId),

    #[error("No CGM data for patient {0}")]
    PatientNotFound(PatientId),

    #[error("Empty CGM series for {0}")]
    EmptySeries(String),

    #[error("Non-numeric cell in column {column}: {value}")]
    NonNumericCell { column: String, value: String },

    #[error("Scaler used before fit: {0}")]
    ScalerNotFitted(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Classifier error: {0}")]
    ClassifierError(String),
}
