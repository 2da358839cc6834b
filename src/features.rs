//! CGM feature derivation
//!
//! This module appends CGM-derived features to a clinical table:
//! - HbA1c estimate from mean glucose
//! - Glucose variance, mean and maximum
//! - Time in the normal range

use crate::config::ExtractorConfig;
use crate::error::ComputeError;
use crate::loader::CgmSource;
use crate::statistics;
use crate::table::ClinicalTable;
use crate::types::{CgmFeatureValues, CgmSeries, PatientId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A derived feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CgmFeature {
    Hba1cEstimate,
    CgmVariance,
    CgmMean,
    CgmTimeInRange,
    CgmMax,
}

impl CgmFeature {
    /// Features in the order they are appended to the table
    pub const ALL: [CgmFeature; 5] = [
        CgmFeature::Hba1cEstimate,
        CgmFeature::CgmVariance,
        CgmFeature::CgmMean,
        CgmFeature::CgmTimeInRange,
        CgmFeature::CgmMax,
    ];

    /// Column name in the augmented table
    pub fn column_name(&self) -> &'static str {
        match self {
            CgmFeature::Hba1cEstimate => "hba1c_estimate",
            CgmFeature::CgmVariance => "cgm_variance",
            CgmFeature::CgmMean => "cgm_mean",
            CgmFeature::CgmTimeInRange => "cgm_time_in_range",
            CgmFeature::CgmMax => "cgm_max",
        }
    }

    /// Formula description for the configured constants
    pub fn formula(&self, config: &ExtractorConfig) -> String {
        match self {
            CgmFeature::Hba1cEstimate => format!(
                "{} * mean(readings) + {}",
                config.hba1c_slope, config.hba1c_intercept
            ),
            CgmFeature::CgmVariance => {
                format!("variance(readings), denominator n - {}", config.variance_ddof)
            }
            CgmFeature::CgmMean => "mean(readings)".to_string(),
            CgmFeature::CgmTimeInRange => format!(
                "fraction of readings in [{}, {}]",
                config.range_low, config.range_high
            ),
            CgmFeature::CgmMax => "max(readings)".to_string(),
        }
    }

    /// Compute this feature over one patient's readings
    pub fn compute(&self, readings: &[f64], config: &ExtractorConfig) -> Result<f64, ComputeError> {
        match self {
            CgmFeature::Hba1cEstimate => {
                statistics::hba1c_estimate(readings, config.hba1c_slope, config.hba1c_intercept)
            }
            CgmFeature::CgmVariance => statistics::variance(readings, config.variance_ddof),
            CgmFeature::CgmMean => statistics::mean(readings),
            CgmFeature::CgmTimeInRange => {
                statistics::time_in_range(readings, config.range_low, config.range_high)
            }
            CgmFeature::CgmMax => statistics::max(readings),
        }
    }
}

/// Compute all five features for one series
pub fn compute_series(
    series: &CgmSeries,
    config: &ExtractorConfig,
) -> Result<CgmFeatureValues, ComputeError> {
    if series.is_empty() {
        return Err(ComputeError::EmptySeries(format!(
            "patient {}",
            series.patient_id
        )));
    }
    let readings = series.as_slice();

    Ok(CgmFeatureValues {
        hba1c_estimate: CgmFeature::Hba1cEstimate.compute(readings, config)?,
        cgm_variance: CgmFeature::CgmVariance.compute(readings, config)?,
        cgm_mean: CgmFeature::CgmMean.compute(readings, config)?,
        cgm_time_in_range: CgmFeature::CgmTimeInRange.compute(readings, config)?,
        cgm_max: CgmFeature::CgmMax.compute(readings, config)?,
    })
}

impl CgmFeatureValues {
    /// Value of one feature
    pub fn get(&self, feature: CgmFeature) -> f64 {
        match feature {
            CgmFeature::Hba1cEstimate => self.hba1c_estimate,
            CgmFeature::CgmVariance => self.cgm_variance,
            CgmFeature::CgmMean => self.cgm_mean,
            CgmFeature::CgmTimeInRange => self.cgm_time_in_range,
            CgmFeature::CgmMax => self.cgm_max,
        }
    }
}

/// Stateless extractor that augments clinical tables with CGM features
pub struct FeatureExtractor {
    source: Box<dyn CgmSource>,
    config: ExtractorConfig,
}

impl FeatureExtractor {
    /// Create an extractor with default constants
    pub fn new(source: Box<dyn CgmSource>) -> Self {
        Self::with_config(source, ExtractorConfig::default())
    }

    pub fn with_config(source: Box<dyn CgmSource>, config: ExtractorConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn CgmSource {
        self.source.as_ref()
    }

    /// No-op; the extractor holds no fitted state
    pub fn fit<Y>(&mut self, _table: &ClinicalTable, _labels: &[Y]) -> &mut Self {
        self
    }

    /// Features for a single patient
    pub fn extract_patient(&self, patient_id: PatientId) -> Result<CgmFeatureValues, ComputeError> {
        let series = self.source.load(patient_id)?;
        compute_series(&series, &self.config)
    }

    /// Per-patient features for every row, in table order.
    ///
    /// Stops at the first patient that fails to load or compute.
    pub fn extract(
        &self,
        table: &ClinicalTable,
    ) -> Result<Vec<(PatientId, CgmFeatureValues)>, ComputeError> {
        table
            .patient_ids()
            .iter()
            .map(|&patient_id| {
                let values = self.extract_patient(patient_id)?;
                debug!(patient = %patient_id, ?values, "derived CGM features");
                Ok((patient_id, values))
            })
            .collect()
    }

    /// Append the five feature columns to the table.
    ///
    /// The table is only modified once every patient has been computed, so a
    /// failure leaves it untouched.
    pub fn transform(&self, table: &mut ClinicalTable) -> Result<(), ComputeError> {
        let per_patient = self.extract(table)?;

        for feature in CgmFeature::ALL {
            let column: Vec<f64> = per_patient
                .iter()
                .map(|(_, values)| values.get(feature))
                .collect();
            table.set_column(feature.column_name(), column)?;
        }

        info!(
            patients = table.len(),
            source = %self.source.describe(),
            "appended CGM features"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryCgmSource;
    use crate::table::Cell;
    use pretty_assertions::assert_eq;

    fn two_patient_source() -> Box<dyn CgmSource> {
        Box::new(InMemoryCgmSource::from_series([
            (PatientId(1), vec![100.0, 100.0, 100.0]),
            (PatientId(2), vec![50.0, 150.0]),
        ]))
    }

    fn clinical(ids: &[i64]) -> ClinicalTable {
        let mut table = ClinicalTable::new("patient_id", vec!["age".to_string()]);
        for &id in ids {
            table
                .push_row(PatientId(id), vec![Cell::Number(50.0 + id as f64)])
                .unwrap();
        }
        table
    }

    #[test]
    fn test_transform_two_patients() {
        let extractor = FeatureExtractor::new(two_patient_source());
        let mut table = clinical(&[1, 2]);

        extractor.transform(&mut table).unwrap();

        assert_eq!(
            table.columns(),
            &[
                "age",
                "hba1c_estimate",
                "cgm_variance",
                "cgm_mean",
                "cgm_time_in_range",
                "cgm_max"
            ]
        );

        let num = |id: i64, col: &str| table.cell(PatientId(id), col).and_then(Cell::as_f64).unwrap();

        assert_eq!(num(1, "cgm_mean"), 100.0);
        assert_eq!(num(1, "cgm_variance"), 0.0);
        assert_eq!(num(1, "cgm_max"), 100.0);
        assert_eq!(num(1, "cgm_time_in_range"), 1.0);
        assert!((num(1, "hba1c_estimate") - 5.379).abs() < 1e-9);

        assert_eq!(num(2, "cgm_mean"), 100.0);
        assert_eq!(num(2, "cgm_time_in_range"), 0.0);
        assert_eq!(num(2, "cgm_max"), 150.0);
        assert_eq!(num(2, "cgm_variance"), 5000.0);

        // Existing attributes are preserved
        assert_eq!(num(2, "age"), 52.0);
    }

    #[test]
    fn test_missing_patient_aborts_and_leaves_table_unchanged() {
        let extractor = FeatureExtractor::new(two_patient_source());
        let mut table = clinical(&[1, 3, 2]);
        let before = table.clone();

        let result = extractor.transform(&mut table);

        assert!(matches!(result, Err(ComputeError::PatientNotFound(PatientId(3)))));
        assert_eq!(table, before);
    }

    #[test]
    fn test_empty_series_is_an_error() {
        let source = InMemoryCgmSource::from_series([(PatientId(1), vec![])]);
        let extractor = FeatureExtractor::new(Box::new(source));
        let result = extractor.extract_patient(PatientId(1));
        assert!(matches!(result, Err(ComputeError::EmptySeries(_))));
    }

    #[test]
    fn test_single_reading_patient_gets_nan_variance() {
        let source = InMemoryCgmSource::from_series([
            (PatientId(1), vec![100.0, 100.0, 100.0]),
            (PatientId(2), vec![110.0]),
        ]);
        let extractor = FeatureExtractor::new(Box::new(source));
        let mut table = clinical(&[1, 2]);

        extractor.transform(&mut table).unwrap();

        let num = |id: i64, col: &str| table.cell(PatientId(id), col).and_then(Cell::as_f64).unwrap();
        assert_eq!(num(1, "cgm_variance"), 0.0);
        assert!(num(2, "cgm_variance").is_nan());
        assert_eq!(num(2, "cgm_mean"), 110.0);
        assert_eq!(num(2, "cgm_max"), 110.0);
        assert_eq!(num(2, "cgm_time_in_range"), 1.0);
        assert!((num(2, "hba1c_estimate") - (0.0296 * 110.0 + 2.419)).abs() < 1e-9);
    }

    #[test]
    fn test_single_reading_population_variance_is_zero() {
        let source = InMemoryCgmSource::from_series([(PatientId(1), vec![110.0])]);
        let config = ExtractorConfig {
            variance_ddof: 0,
            ..Default::default()
        };
        let population = FeatureExtractor::with_config(Box::new(source), config);
        let values = population.extract_patient(PatientId(1)).unwrap();
        assert_eq!(values.cgm_variance, 0.0);
        assert_eq!(values.cgm_time_in_range, 1.0);
    }

    #[test]
    fn test_constant_series() {
        let source = InMemoryCgmSource::from_series([(PatientId(8), vec![180.0; 10])]);
        let extractor = FeatureExtractor::new(Box::new(source));
        let values = extractor.extract_patient(PatientId(8)).unwrap();

        assert_eq!(values.cgm_variance, 0.0);
        assert_eq!(values.cgm_mean, 180.0);
        assert_eq!(values.cgm_time_in_range, 0.0);
    }

    #[test]
    fn test_custom_range() {
        let source = InMemoryCgmSource::from_series([(PatientId(1), vec![60.0, 150.0, 200.0])]);
        let config = ExtractorConfig {
            range_low: 54.0,
            range_high: 180.0,
            ..Default::default()
        };
        let extractor = FeatureExtractor::with_config(Box::new(source), config);
        let values = extractor.extract_patient(PatientId(1)).unwrap();
        assert!((values.cgm_time_in_range - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_overwrites_existing_feature_columns() {
        let extractor = FeatureExtractor::new(two_patient_source());
        let mut table = clinical(&[1, 2]);

        extractor.transform(&mut table).unwrap();
        extractor.transform(&mut table).unwrap();

        assert_eq!(table.columns().len(), 6);
    }

    #[test]
    fn test_fit_is_a_no_op() {
        let mut extractor = FeatureExtractor::new(two_patient_source());
        let table = clinical(&[1, 2]);
        let before = extractor.config().clone();

        extractor.fit(&table, &[0_i64, 1]);

        assert_eq!(extractor.config(), &before);
    }

    #[test]
    fn test_feature_names() {
        let names: Vec<&str> = CgmFeature::ALL.iter().map(|f| f.column_name()).collect();
        assert_eq!(
            names,
            vec![
                "hba1c_estimate",
                "cgm_variance",
                "cgm_mean",
                "cgm_time_in_range",
                "cgm_max"
            ]
        );
    }
}
