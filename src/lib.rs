//! CGM Features - clinical classification with glucose-derived features
//!
//! Augments a per-patient clinical table with features computed from each
//! patient's continuous glucose monitoring (CGM) series, then feeds the result
//! through a deterministic chain: CGM loading → feature derivation →
//! standardization → range scaling → classifier.
//!
//! ## Derived features
//!
//! - `hba1c_estimate`: linear HbA1c proxy from mean glucose
//! - `cgm_variance`, `cgm_mean`, `cgm_max`
//! - `cgm_time_in_range`: fraction of readings in the normal range

pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod loader;
pub mod pipeline;
pub mod preprocessing;
pub mod statistics;
pub mod table;
pub mod types;

pub use config::{ClassifierConfig, ExtractorConfig, LoaderConfig, Settings};
pub use error::ComputeError;
pub use features::{compute_series, CgmFeature, FeatureExtractor};
pub use loader::{CgmSource, CsvCgmSource, InMemoryCgmSource};
pub use pipeline::{augment_clinical_csv, CgmPipeline, Classifier};
pub use preprocessing::{MinMaxScaler, StandardScaler, Transformer};
pub use table::{Cell, ClinicalTable};
pub use types::{CgmFeatureValues, CgmSeries, PatientId};

/// Crate version embedded in feature reports
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for feature reports
pub const PRODUCER_NAME: &str = "cgm-features";
