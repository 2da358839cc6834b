//! Core types for CGM feature extraction
//!
//! This module defines the values that flow between the loader, the feature
//! extractor and the encoders: patient identifiers, CGM series and the
//! per-patient derived feature record.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Patient identifier shared by the clinical table and the CGM source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub i64);

impl PatientId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PatientId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// `i64` bounds as floats; the upper bound (2^63) is itself out of range
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

impl FromStr for PatientId {
    type Err = ComputeError;

    /// Accepts integers and integral floats (`"3"`, `" 3 "`, `"3.0"`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(Self(id));
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(&v) => Ok(Self(v as i64)),
            _ => Err(ComputeError::ParseError(format!(
                "Invalid patient id: {trimmed:?}"
            ))),
        }
    }
}

/// Ordered glucose readings for one patient, missing values already removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgmSeries {
    pub patient_id: PatientId,
    /// Readings in source order (mg/dL)
    pub readings: Vec<f64>,
}

impl CgmSeries {
    pub fn new(patient_id: PatientId, readings: Vec<f64>) -> Self {
        Self {
            patient_id,
            readings,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.readings
    }
}

/// The five CGM-derived features for one patient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CgmFeatureValues {
    /// Linear HbA1c proxy (%)
    pub hba1c_estimate: f64,
    /// Variance of readings
    pub cgm_variance: f64,
    /// Mean reading (mg/dL)
    pub cgm_mean: f64,
    /// Fraction of readings inside the normal range (0-1)
    pub cgm_time_in_range: f64,
    /// Maximum reading (mg/dL)
    pub cgm_max: f64,
}

/// Report producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Report provenance information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProvenance {
    /// Description of the CGM source the features were computed from
    pub cgm_source: String,
    pub computed_at_utc: String,
}

/// Features for one patient in a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientFeatures {
    pub patient_id: PatientId,
    #[serde(flatten)]
    pub features: CgmFeatureValues,
}

/// JSON feature report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub patients: Vec<PatientFeatures>,
}
