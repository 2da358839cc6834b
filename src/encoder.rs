//! Output encoding
//!
//! Augmented tables are written back to CSV with the index column first.
//! Per-patient features can also be encoded as a JSON report carrying
//! producer and provenance metadata.

use crate::error::ComputeError;
use crate::table::ClinicalTable;
use crate::types::{
    CgmFeatureValues, FeatureReport, PatientFeatures, PatientId, ReportProducer, ReportProvenance,
};
use crate::{CRATE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use std::io::Write;
use uuid::Uuid;

/// Current feature report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Write a clinical table as CSV
pub fn write_csv<W: Write>(table: &ClinicalTable, writer: W) -> Result<(), ComputeError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(table.columns().len() + 1);
    header.push(table.index_name().to_string());
    header.extend(table.columns().iter().cloned());
    csv_writer.write_record(&header)?;

    for (patient_id, cells) in table.rows() {
        let mut record = Vec::with_capacity(cells.len() + 1);
        record.push(patient_id.to_string());
        record.extend(cells.iter().map(|c| c.to_field()));
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Render a clinical table as a CSV string
pub fn to_csv_string(table: &ClinicalTable) -> Result<String, ComputeError> {
    let mut buffer = Vec::new();
    write_csv(table, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ComputeError::ParseError(e.to_string()))
}

/// Encoder for JSON feature reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Build a report from per-patient features
    pub fn encode(
        &self,
        features: &[(PatientId, CgmFeatureValues)],
        cgm_source: &str,
    ) -> FeatureReport {
        FeatureReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: CRATE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            provenance: ReportProvenance {
                cgm_source: cgm_source.to_string(),
                computed_at_utc: Utc::now().to_rfc3339(),
            },
            patients: features
                .iter()
                .map(|(patient_id, values)| PatientFeatures {
                    patient_id: *patient_id,
                    features: *values,
                })
                .collect(),
        }
    }

    /// Encode to a JSON string
    pub fn encode_to_json(
        &self,
        features: &[(PatientId, CgmFeatureValues)],
        cgm_source: &str,
        pretty: bool,
    ) -> Result<String, ComputeError> {
        let report = self.encode(features, cgm_source);
        let json = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;
    use pretty_assertions::assert_eq;

    fn values() -> CgmFeatureValues {
        CgmFeatureValues {
            hba1c_estimate: 5.379,
            cgm_variance: 0.0,
            cgm_mean: 100.0,
            cgm_time_in_range: 1.0,
            cgm_max: 100.0,
        }
    }

    #[test]
    fn test_csv_output_has_index_first() {
        let mut table = ClinicalTable::new("patient_id", vec!["sex".to_string()]);
        table
            .push_row(PatientId(1), vec![Cell::Text("F".to_string())])
            .unwrap();
        table.push_row(PatientId(2), vec![Cell::Missing]).unwrap();
        table.set_column("cgm_max", vec![100.0, 150.5]).unwrap();

        let csv = to_csv_string(&table).unwrap();

        assert_eq!(csv, "patient_id,sex,cgm_max\n1,F,100\n2,,150.5\n");
    }

    #[test]
    fn test_csv_round_trip_through_reader() {
        let input = "patient_id,age\n3,61\n4,47\n";
        let table = ClinicalTable::from_reader(input.as_bytes(), None).unwrap();
        let output = to_csv_string(&table).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_report_metadata() {
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let json = encoder
            .encode_to_json(&[(PatientId(1), values())], "csv:external_data.csv", false)
            .unwrap();

        let report: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(report["report_version"], "1.0.0");
        assert_eq!(report["producer"]["name"], "cgm-features");
        assert_eq!(report["producer"]["instance_id"], "test-instance");
        assert_eq!(report["provenance"]["cgm_source"], "csv:external_data.csv");
        assert!(report["provenance"]["computed_at_utc"].as_str().is_some());

        let patient = &report["patients"][0];
        assert_eq!(patient["patient_id"], 1);
        assert_eq!(patient["cgm_mean"], 100.0);
        assert_eq!(patient["cgm_time_in_range"], 1.0);
    }

    #[test]
    fn test_encoder_instance_ids_are_unique() {
        let a = ReportEncoder::new().encode(&[], "memory");
        let b = ReportEncoder::new().encode(&[], "memory");
        assert_ne!(a.producer.instance_id, b.producer.instance_id);
        assert!(a.patients.is_empty());
    }
}
