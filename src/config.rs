//! Configuration for the loader, feature extractor and classifier
//!
//! All configs deserialize from JSON with every field optional; missing fields
//! take the defaults below.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default lower bound of the normal glucose range (mg/dL, inclusive)
pub const DEFAULT_RANGE_LOW: f64 = 70.0;

/// Default upper bound of the normal glucose range (mg/dL, inclusive)
pub const DEFAULT_RANGE_HIGH: f64 = 127.0;

/// Default HbA1c proxy slope applied to mean glucose
pub const DEFAULT_HBA1C_SLOPE: f64 = 0.0296;

/// Default HbA1c proxy intercept
pub const DEFAULT_HBA1C_INTERCEPT: f64 = 2.419;

/// Default key column in the CGM source
pub const DEFAULT_PATIENT_COLUMN: &str = "patient_id";

/// CGM source layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Column holding the patient identifier
    pub patient_column: String,
    /// Columns holding readings; `None` means every other column
    pub value_columns: Option<Vec<String>>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            patient_column: DEFAULT_PATIENT_COLUMN.to_string(),
            value_columns: None,
        }
    }
}

/// Feature extractor constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Inclusive lower bound for time-in-range
    pub range_low: f64,
    /// Inclusive upper bound for time-in-range
    pub range_high: f64,
    pub hba1c_slope: f64,
    pub hba1c_intercept: f64,
    /// Delta degrees of freedom for variance (1 = sample variance)
    pub variance_ddof: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            range_low: DEFAULT_RANGE_LOW,
            range_high: DEFAULT_RANGE_HIGH,
            hba1c_slope: DEFAULT_HBA1C_SLOPE,
            hba1c_intercept: DEFAULT_HBA1C_INTERCEPT,
            variance_ddof: 1,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.range_low > self.range_high {
            return Err(ComputeError::ParseError(format!(
                "range_low ({}) must not exceed range_high ({})",
                self.range_low, self.range_high
            )));
        }
        Ok(())
    }
}

/// Fixed hyperparameters handed to the external gradient-boosting classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub max_depth: usize,
    pub random_state: u64,
    /// Share of training rows held out for early stopping
    pub validation_fraction: f64,
    /// Per-label weight; labels not listed weigh 1.0
    pub class_weight: BTreeMap<i64, f64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            random_state: 42,
            validation_fraction: 0.3,
            class_weight: BTreeMap::from([(1, 0.9), (0, 0.3)]),
        }
    }
}

impl ClassifierConfig {
    /// Weight for one label
    pub fn weight_for(&self, label: i64) -> f64 {
        self.class_weight.get(&label).copied().unwrap_or(1.0)
    }

    /// Per-sample weights derived from the class weights
    pub fn sample_weights(&self, labels: &[i64]) -> Vec<f64> {
        labels.iter().map(|&label| self.weight_for(label)).collect()
    }
}

/// Combined settings, as read from a JSON config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub loader: LoaderConfig,
    pub extractor: ExtractorConfig,
    pub classifier: ClassifierConfig,
}

impl Settings {
    /// Parse settings from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.extractor.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }
}
