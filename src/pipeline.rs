//! Pipeline orchestration
//!
//! This module provides the public API for the estimator. It composes the
//! CGM feature extractor, the scaling chain and an external classifier.

use crate::config::{ClassifierConfig, Settings};
use crate::error::ComputeError;
use crate::features::FeatureExtractor;
use crate::loader::{CgmSource, CsvCgmSource, InMemoryCgmSource};
use crate::preprocessing::{default_preprocessing, Transformer};
use crate::table::ClinicalTable;
use ndarray::Array2;
use std::path::Path;
use tracing::info;

/// Classifier consumed by the pipeline.
///
/// The gradient-boosting implementation lives outside this crate; it receives
/// the fixed hyperparameters and class-weighted sample weights on `fit`.
pub trait Classifier {
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &[i64],
        sample_weight: &[f64],
        params: &ClassifierConfig,
    ) -> Result<(), ComputeError>;

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<i64>, ComputeError>;
}

/// Build a CGM source from a CSV path.
///
/// With `reread` the file is read again on every lookup; otherwise it is
/// loaded once up front.
pub fn open_cgm_source(
    cgm_path: &Path,
    settings: &Settings,
    reread: bool,
) -> Result<Box<dyn CgmSource>, ComputeError> {
    if reread {
        Ok(Box::new(CsvCgmSource::with_config(
            cgm_path,
            settings.loader.clone(),
        )))
    } else {
        Ok(Box::new(InMemoryCgmSource::from_path(
            cgm_path,
            &settings.loader,
        )?))
    }
}

/// Read a clinical CSV and append the CGM features from a CGM CSV.
///
/// # Arguments
/// * `clinical_path` - Clinical table, indexed by its first column
/// * `cgm_path` - CGM readings keyed by patient id
/// * `settings` - Loader and extractor settings
/// * `reread` - Re-read the CGM file for every patient
///
/// # Example
/// ```ignore
/// let table = augment_clinical_csv(
///     Path::new("clinical.csv"),
///     Path::new("external_data.csv"),
///     &Settings::default(),
///     false,
/// )?;
/// ```
pub fn augment_clinical_csv(
    clinical_path: &Path,
    cgm_path: &Path,
    settings: &Settings,
    reread: bool,
) -> Result<ClinicalTable, ComputeError> {
    let mut table = ClinicalTable::from_path(clinical_path, None)?;
    let source = open_cgm_source(cgm_path, settings, reread)?;
    let extractor = FeatureExtractor::with_config(source, settings.extractor.clone());
    extractor.transform(&mut table)?;
    Ok(table)
}

/// Feature extraction, scaling and classification chained behind fit/predict
pub struct CgmPipeline<C: Classifier> {
    extractor: FeatureExtractor,
    preprocessing: Vec<Box<dyn Transformer>>,
    classifier: C,
    config: ClassifierConfig,
    fitted_columns: Option<Vec<String>>,
}

impl<C: Classifier> CgmPipeline<C> {
    /// Create a pipeline with the default scaling chain and classifier settings
    pub fn new(extractor: FeatureExtractor, classifier: C) -> Self {
        Self::with_config(extractor, classifier, ClassifierConfig::default())
    }

    pub fn with_config(extractor: FeatureExtractor, classifier: C, config: ClassifierConfig) -> Self {
        Self {
            extractor,
            preprocessing: default_preprocessing(),
            classifier,
            config,
            fitted_columns: None,
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn classifier_config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Augment a copy of the table and convert it to a numeric matrix
    fn features(&self, table: &ClinicalTable) -> Result<(Vec<String>, Array2<f64>), ComputeError> {
        let mut augmented = table.clone();
        self.extractor.transform(&mut augmented)?;
        let matrix = augmented.to_matrix()?;
        Ok((augmented.columns().to_vec(), matrix))
    }

    /// Fit every stage on a clinical table and its labels
    pub fn fit(&mut self, table: &ClinicalTable, labels: &[i64]) -> Result<&mut Self, ComputeError> {
        if labels.len() != table.len() {
            return Err(ComputeError::ShapeMismatch(format!(
                "{} labels for {} rows",
                labels.len(),
                table.len()
            )));
        }

        self.extractor.fit(table, labels);
        let (columns, mut x) = self.features(table)?;

        for stage in self.preprocessing.iter_mut() {
            x = stage.fit_transform(&x)?;
        }

        let sample_weight = self.config.sample_weights(labels);
        self.classifier.fit(&x, labels, &sample_weight, &self.config)?;
        self.fitted_columns = Some(columns);

        info!(rows = table.len(), "fitted CGM pipeline");
        Ok(self)
    }

    /// Predict labels for a clinical table
    pub fn predict(&self, table: &ClinicalTable) -> Result<Vec<i64>, ComputeError> {
        let fitted_columns = self
            .fitted_columns
            .as_ref()
            .ok_or_else(|| ComputeError::ClassifierError("pipeline is not fitted".to_string()))?;

        let (columns, mut x) = self.features(table)?;
        if &columns != fitted_columns {
            return Err(ComputeError::ShapeMismatch(format!(
                "columns {:?} differ from fitted columns {:?}",
                columns, fitted_columns
            )));
        }

        for stage in &self.preprocessing {
            x = stage.transform(&x)?;
        }
        self.classifier.predict(&x)
    }
}
