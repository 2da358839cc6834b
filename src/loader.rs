//! CGM data sources
//!
//! A source maps a patient id to that patient's glucose readings. The CSV
//! layout has a patient id key column; every other column (or the configured
//! `value_columns`) holds readings. All rows matching the patient are read in
//! file order and missing cells are dropped.

use crate::config::LoaderConfig;
use crate::error::ComputeError;
use crate::table::is_missing;
use crate::types::{CgmSeries, PatientId};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Trait for CGM data sources
pub trait CgmSource {
    /// Load the readings for one patient.
    ///
    /// Fails with `PatientNotFound` when the source has no row for the patient.
    fn load(&self, patient_id: PatientId) -> Result<CgmSeries, ComputeError>;

    /// Short human-readable description used in provenance metadata
    fn describe(&self) -> String;
}

/// Column positions resolved from a CSV header
struct CsvLayout {
    key_pos: usize,
    value_cols: Vec<(usize, String)>,
}

impl CsvLayout {
    fn resolve(headers: &csv::StringRecord, config: &LoaderConfig) -> Result<Self, ComputeError> {
        let key_pos = headers
            .iter()
            .position(|h| h.trim() == config.patient_column)
            .ok_or_else(|| ComputeError::MissingColumn(config.patient_column.clone()))?;

        let value_cols = match &config.value_columns {
            Some(wanted) => wanted
                .iter()
                .map(|name| {
                    headers
                        .iter()
                        .position(|h| h.trim() == name)
                        .map(|pos| (pos, name.clone()))
                        .ok_or_else(|| ComputeError::MissingColumn(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != key_pos)
                .map(|(i, h)| (i, h.trim().to_string()))
                .collect(),
        };

        Ok(Self {
            key_pos,
            value_cols,
        })
    }

    fn readings(&self, record: &csv::StringRecord, out: &mut Vec<f64>) -> Result<(), ComputeError> {
        for (pos, name) in &self.value_cols {
            let raw = record.get(*pos).unwrap_or("");
            if is_missing(raw) {
                continue;
            }
            let value = raw
                .trim()
                .parse::<f64>()
                .map_err(|_| ComputeError::NonNumericCell {
                    column: name.clone(),
                    value: raw.to_string(),
                })?;
            if value.is_nan() {
                continue;
            }
            out.push(value);
        }
        Ok(())
    }
}

/// Read CGM rows from CSV, keeping only `wanted` when given.
///
/// Returns readings grouped by patient, in order of first appearance.
fn read_cgm_csv<R: Read>(
    reader: R,
    config: &LoaderConfig,
    wanted: Option<PatientId>,
) -> Result<Vec<(PatientId, Vec<f64>)>, ComputeError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let layout = CsvLayout::resolve(&headers, config)?;

    let mut grouped: Vec<(PatientId, Vec<f64>)> = Vec::new();
    let mut positions: HashMap<PatientId, usize> = HashMap::new();

    for record in csv_reader.records() {
        let record = record?;
        let raw_id = record.get(layout.key_pos).unwrap_or("");
        if is_missing(raw_id) {
            continue;
        }
        let patient_id: PatientId = raw_id.parse()?;
        if wanted.is_some_and(|w| w != patient_id) {
            continue;
        }

        let pos = *positions.entry(patient_id).or_insert_with(|| {
            grouped.push((patient_id, Vec::new()));
            grouped.len() - 1
        });
        layout.readings(&record, &mut grouped[pos].1)?;
    }

    Ok(grouped)
}

/// CSV source that re-reads the whole file on every lookup
#[derive(Debug, Clone)]
pub struct CsvCgmSource {
    path: PathBuf,
    config: LoaderConfig,
}

impl CsvCgmSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, LoaderConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: LoaderConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CgmSource for CsvCgmSource {
    fn load(&self, patient_id: PatientId) -> Result<CgmSeries, ComputeError> {
        let file = std::fs::File::open(&self.path)?;
        let mut rows = read_cgm_csv(file, &self.config, Some(patient_id))?;

        let (_, readings) = rows
            .pop()
            .ok_or(ComputeError::PatientNotFound(patient_id))?;

        debug!(
            patient = %patient_id,
            readings = readings.len(),
            path = %self.path.display(),
            "loaded CGM series"
        );
        Ok(CgmSeries::new(patient_id, readings))
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// Source holding every patient's readings in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCgmSource {
    series: HashMap<PatientId, Vec<f64>>,
    origin: String,
}

impl InMemoryCgmSource {
    /// Build from already-loaded series. NaN readings are dropped.
    pub fn from_series<I>(series: I) -> Self
    where
        I: IntoIterator<Item = (PatientId, Vec<f64>)>,
    {
        let series: HashMap<PatientId, Vec<f64>> = series
            .into_iter()
            .map(|(id, readings)| {
                let readings = readings.into_iter().filter(|v| !v.is_nan()).collect();
                (id, readings)
            })
            .collect();
        Self {
            series,
            origin: "memory".to_string(),
        }
    }

    /// Load the whole CSV once
    pub fn from_reader<R: Read>(reader: R, config: &LoaderConfig) -> Result<Self, ComputeError> {
        let grouped = read_cgm_csv(reader, config, None)?;
        Ok(Self {
            series: grouped.into_iter().collect(),
            origin: "memory".to_string(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>, config: &LoaderConfig) -> Result<Self, ComputeError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let mut source = Self::from_reader(file, config)?;
        source.origin = format!("csv:{}", path.display());
        debug!(
            patients = source.series.len(),
            path = %path.display(),
            "cached CGM source"
        );
        Ok(source)
    }

    /// Patient ids in ascending order
    pub fn patient_ids(&self) -> Vec<PatientId> {
        let mut ids: Vec<PatientId> = self.series.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn patient_count(&self) -> usize {
        self.series.len()
    }

    /// Total readings across all patients
    pub fn reading_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

impl CgmSource for InMemoryCgmSource {
    fn load(&self, patient_id: PatientId) -> Result<CgmSeries, ComputeError> {
        self.series
            .get(&patient_id)
            .map(|readings| CgmSeries::new(patient_id, readings.clone()))
            .ok_or(ComputeError::PatientNotFound(patient_id))
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const WIDE_CSV: &str = "\
patient_id,t0,t1,t2,t3
1,100,,105,NaN
2,50,150,,
3,,,,
";

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_csv_source_drops_missing_values() {
        let file = write_csv(WIDE_CSV);
        let source = CsvCgmSource::new(file.path());

        let series = source.load(PatientId(1)).unwrap();
        assert_eq!(series.readings, vec![100.0, 105.0]);

        let series = source.load(PatientId(2)).unwrap();
        assert_eq!(series.readings, vec![50.0, 150.0]);
    }

    #[test]
    fn test_nan_spellings_are_dropped() {
        let file = write_csv(
            "patient_id,t0,t1,t2,t3,t4,t5\n1,100,NAN,120,#N/A N/A,-1.#IND,nan \n2,90,#NA,1.#QNAN,-nan,95,NaN\n",
        );
        let source = CsvCgmSource::new(file.path());
        assert_eq!(source.load(PatientId(1)).unwrap().readings, vec![100.0, 120.0]);
        assert_eq!(source.load(PatientId(2)).unwrap().readings, vec![90.0, 95.0]);

        let cached = InMemoryCgmSource::from_path(file.path(), &LoaderConfig::default()).unwrap();
        assert_eq!(cached.reading_count(), 4);
    }

    #[test]
    fn test_all_missing_gives_empty_series() {
        let file = write_csv(WIDE_CSV);
        let source = CsvCgmSource::new(file.path());
        assert!(source.load(PatientId(3)).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_patient() {
        let file = write_csv(WIDE_CSV);
        let source = CsvCgmSource::new(file.path());
        assert!(matches!(
            source.load(PatientId(99)),
            Err(ComputeError::PatientNotFound(PatientId(99)))
        ));
    }

    #[test]
    fn test_csv_source_rereads_file_on_each_call() {
        let mut file = write_csv("patient_id,t0\n1,100\n");
        let source = CsvCgmSource::new(file.path());
        assert_eq!(source.load(PatientId(1)).unwrap().readings, vec![100.0]);

        file.write_all(b"1,120\n").unwrap();
        file.flush().unwrap();
        assert_eq!(source.load(PatientId(1)).unwrap().readings, vec![100.0, 120.0]);
    }

    #[test]
    fn test_long_layout_concatenates_rows_in_order() {
        let csv = "patient_id,glucose\n4,90\n5,200\n4,95\n4,\n";
        let source = InMemoryCgmSource::from_reader(csv.as_bytes(), &LoaderConfig::default()).unwrap();
        assert_eq!(source.load(PatientId(4)).unwrap().readings, vec![90.0, 95.0]);
        assert_eq!(source.load(PatientId(5)).unwrap().readings, vec![200.0]);
    }

    #[test]
    fn test_value_columns_selection() {
        let csv = "timestamp,subject,glucose\n2024-01-01T00:00,7,101\n2024-01-01T00:05,7,103\n";
        let config = LoaderConfig {
            patient_column: "subject".to_string(),
            value_columns: Some(vec!["glucose".to_string()]),
        };
        let source = InMemoryCgmSource::from_reader(csv.as_bytes(), &config).unwrap();
        assert_eq!(source.load(PatientId(7)).unwrap().readings, vec![101.0, 103.0]);
    }

    #[test]
    fn test_missing_key_column() {
        let csv = "id,t0\n1,100\n";
        let result = InMemoryCgmSource::from_reader(csv.as_bytes(), &LoaderConfig::default());
        assert!(matches!(result, Err(ComputeError::MissingColumn(_))));
    }

    #[test]
    fn test_non_numeric_reading() {
        let csv = "patient_id,t0\n1,high\n";
        let result = InMemoryCgmSource::from_reader(csv.as_bytes(), &LoaderConfig::default());
        assert!(matches!(result, Err(ComputeError::NonNumericCell { .. })));
    }

    #[test]
    fn test_in_memory_counts() {
        let source = InMemoryCgmSource::from_reader(WIDE_CSV.as_bytes(), &LoaderConfig::default())
            .unwrap();
        assert_eq!(source.patient_ids(), vec![PatientId(1), PatientId(2), PatientId(3)]);
        assert_eq!(source.patient_count(), 3);
        assert_eq!(source.reading_count(), 4);
    }

    #[test]
    fn test_from_series_drops_nan() {
        let source = InMemoryCgmSource::from_series([(PatientId(1), vec![100.0, f64::NAN, 90.0])]);
        assert_eq!(source.load(PatientId(1)).unwrap().readings, vec![100.0, 90.0]);
        assert_eq!(source.describe(), "memory");
    }
}
