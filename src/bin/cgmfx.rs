//! cgmfx CLI - Command-line interface for CGM feature extraction
//!
//! Commands:
//! - transform: Append CGM features to a clinical CSV
//! - patient: Compute features for a single patient
//! - doctor: Diagnose the CGM source and configuration
//! - schema: Describe the derived feature columns

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cgm_features::encoder::{to_csv_string, ReportEncoder};
use cgm_features::features::compute_series;
use cgm_features::pipeline::open_cgm_source;
use cgm_features::{
    CgmFeature, CgmSource, ClinicalTable, ComputeError, FeatureExtractor, InMemoryCgmSource,
    PatientId, Settings, CRATE_VERSION, PRODUCER_NAME,
};

/// cgmfx - CGM-derived features for clinical classification
#[derive(Parser)]
#[command(name = "cgmfx")]
#[command(author = "Synheart AI Inc")]
#[command(version = CRATE_VERSION)]
#[command(about = "Append CGM-derived features to clinical tables", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append CGM features to a clinical CSV
    Transform {
        /// Clinical CSV, indexed by patient id
        #[arg(long)]
        clinical: PathBuf,

        /// CGM readings CSV
        #[arg(long)]
        cgm: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "csv")]
        format: OutputFormat,

        /// Index column of the clinical CSV (defaults to the first column)
        #[arg(long)]
        index_column: Option<String>,

        /// JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Re-read the CGM file for every patient instead of loading it once
        #[arg(long)]
        reread: bool,
    },

    /// Compute features for a single patient
    Patient {
        /// CGM readings CSV
        #[arg(long)]
        cgm: PathBuf,

        /// Patient id
        #[arg(long)]
        id: i64,

        /// JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Diagnose the CGM source and configuration
    Doctor {
        /// CGM readings CSV
        #[arg(long)]
        cgm: Option<PathBuf>,

        /// JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe the derived feature columns
    Schema {
        /// JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Augmented clinical table as CSV
    Csv,
    /// Feature report as compact JSON
    Json,
    /// Feature report as pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CgmCliError> {
    match cli.command {
        Commands::Transform {
            clinical,
            cgm,
            output,
            format,
            index_column,
            config,
            reread,
        } => cmd_transform(
            &clinical,
            &cgm,
            &output,
            format,
            index_column.as_deref(),
            config.as_deref(),
            reread,
        ),

        Commands::Patient { cgm, id, config } => cmd_patient(&cgm, PatientId(id), config.as_deref()),

        Commands::Doctor { cgm, config, json } => {
            cmd_doctor(cgm.as_deref(), config.as_deref(), json)
        }

        Commands::Schema { config } => cmd_schema(config.as_deref()),
    }
}

fn load_settings(config: Option<&Path>) -> Result<Settings, CgmCliError> {
    match config {
        Some(path) => {
            debug!(path = %path.display(), "loading settings");
            Ok(Settings::from_path(path)?)
        }
        None => Ok(Settings::default()),
    }
}

fn cmd_transform(
    clinical: &Path,
    cgm: &Path,
    output: &Path,
    format: OutputFormat,
    index_column: Option<&str>,
    config: Option<&Path>,
    reread: bool,
) -> Result<(), CgmCliError> {
    let settings = load_settings(config)?;

    let mut table = ClinicalTable::from_path(clinical, index_column)?;
    if table.is_empty() {
        return Err(CgmCliError::NoPatients);
    }

    let source = open_cgm_source(cgm, &settings, reread)?;
    let extractor = FeatureExtractor::with_config(source, settings.extractor.clone());

    let output_data = match format {
        OutputFormat::Csv => {
            extractor.transform(&mut table)?;
            to_csv_string(&table)?
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let features = extractor.extract(&table)?;
            let pretty = matches!(format, OutputFormat::JsonPretty);
            ReportEncoder::new().encode_to_json(&features, &extractor.source().describe(), pretty)?
        }
    };

    info!(patients = table.len(), "transform complete");

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", output_data)?;
        stdout.flush()?;
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_patient(cgm: &Path, patient_id: PatientId, config: Option<&Path>) -> Result<(), CgmCliError> {
    let settings = load_settings(config)?;
    println!("{}", patient_report(cgm, patient_id, &settings)?);
    Ok(())
}

/// JSON feature report for one patient. The reading count goes to the log.
fn patient_report(cgm: &Path, patient_id: PatientId, settings: &Settings) -> Result<String, CgmCliError> {
    let source = open_cgm_source(cgm, settings, true)?;
    let series = source.load(patient_id)?;
    let values = compute_series(&series, &settings.extractor)?;

    info!(patient = %patient_id, readings = series.len(), "computed patient features");
    Ok(ReportEncoder::new().encode_to_json(&[(patient_id, values)], &source.describe(), true)?)
}

fn cmd_doctor(cgm: Option<&Path>, config: Option<&Path>, json: bool) -> Result<(), CgmCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, CRATE_VERSION),
    });

    // Settings
    let settings = match config {
        Some(path) => match Settings::from_path(path) {
            Ok(settings) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Settings file valid: {}", path.display()),
                });
                settings
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid settings: {}", e),
                });
                Settings::default()
            }
        },
        None => Settings::default(),
    };

    // CGM source
    if let Some(cgm_path) = cgm {
        if cgm_path.exists() {
            match InMemoryCgmSource::from_path(cgm_path, &settings.loader) {
                Ok(source) => {
                    let empty = source
                        .patient_ids()
                        .into_iter()
                        .filter(|&id| source.load(id).map(|s| s.is_empty()).unwrap_or(true))
                        .count();
                    checks.push(DoctorCheck {
                        name: "cgm_source".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "{} patients, {} readings",
                            source.patient_count(),
                            source.reading_count()
                        ),
                    });
                    if empty > 0 {
                        checks.push(DoctorCheck {
                            name: "cgm_empty_series".to_string(),
                            status: CheckStatus::Warning,
                            message: format!("{} patients have no readings", empty),
                        });
                    }
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "cgm_source".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Cannot read CGM source: {}", e),
                    });
                }
            }
        } else {
            checks.push(DoctorCheck {
                name: "cgm_source".to_string(),
                status: CheckStatus::Error,
                message: "CGM file does not exist".to_string(),
            });
        }
    }

    // stdout destination
    let stdout_check = if atty::is(atty::Stream::Stdout) {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a TTY".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a pipe".to_string(),
        }
    };
    checks.push(stdout_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: CRATE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("cgmfx Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CgmCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(config: Option<&Path>) -> Result<(), CgmCliError> {
    let settings = load_settings(config)?;

    println!("Derived columns (appended in this order):");
    println!();
    for feature in CgmFeature::ALL {
        println!(
            "  {:<18} {}",
            feature.column_name(),
            feature.formula(&settings.extractor)
        );
    }
    println!();
    println!(
        "CGM source: key column '{}', reading columns {}",
        settings.loader.patient_column,
        match &settings.loader.value_columns {
            Some(cols) => cols.join(", "),
            None => "all other columns".to_string(),
        }
    );
    Ok(())
}

// Error handling

#[derive(Debug)]
enum CgmCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoPatients,
    DoctorFailed,
}

impl From<io::Error> for CgmCliError {
    fn from(e: io::Error) -> Self {
        CgmCliError::Io(e)
    }
}

impl From<ComputeError> for CgmCliError {
    fn from(e: ComputeError) -> Self {
        CgmCliError::Compute(e)
    }
}

impl From<serde_json::Error> for CgmCliError {
    fn from(e: serde_json::Error) -> Self {
        CgmCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CgmCliError> for CliError {
    fn from(e: CgmCliError) -> Self {
        match e {
            CgmCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CgmCliError::Compute(ComputeError::PatientNotFound(id)) => CliError {
                code: "PATIENT_NOT_FOUND".to_string(),
                message: format!("No CGM data for patient {}", id),
                hint: Some("Every clinical patient id must appear in the CGM source".to_string()),
            },
            CgmCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CgmCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CgmCliError::NoPatients => CliError {
                code: "NO_PATIENTS".to_string(),
                message: "Clinical table has no rows".to_string(),
                hint: None,
            },
            CgmCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report above".to_string()),
            },
        }
    }
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_patient_report_is_plain_json() {
        let mut cgm = tempfile::NamedTempFile::new().unwrap();
        cgm.write_all(b"patient_id,t0,t1\n4,100,140\n").unwrap();
        cgm.flush().unwrap();

        let report = patient_report(cgm.path(), PatientId(4), &Settings::default()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();

        assert_eq!(parsed["patients"][0]["patient_id"], 4);
        assert_eq!(parsed["patients"][0]["cgm_max"], 140.0);
        assert!(!report.contains("readings"));
    }
}
