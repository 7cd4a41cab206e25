//! gazeqc CLI - Command-line interface for gaze test quality triage
//!
//! Commands:
//! - predict: Score test records with the current model
//! - train: Fit and publish a new model from a labeled corpus
//! - evaluate: Measure model accuracy on a labeled corpus
//! - export: Copy the current model artifact to another path
//! - validate: Validate stored test records
//! - doctor: Diagnose model and configuration health

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use gazeqc::artifact::{ModelArtifact, ARTIFACT_FORMAT};
use gazeqc::schema::{RawRecordAdapter, RawTestRecord, SCHEMA_VERSION};
use gazeqc::types::PredictionResult;
use gazeqc::{
    evaluate, CancellationToken, InMemoryRepository, Predictor, QualityConfig, QualityError,
    TestRecordRepository, TrainingLoop, GAZEQC_VERSION, PRODUCER_NAME,
};

/// gazeqc - Quality triage for clinical gaze-tracking tests
#[derive(Parser)]
#[command(name = "gazeqc")]
#[command(version = GAZEQC_VERSION)]
#[command(about = "Classify gaze-tracking test quality", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model artifact path (overrides GAZEQC_MODEL_PATH and the config file)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score test records with the current model
    Predict {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "record")]
        input_format: InputFormat,

        /// Only score the record with this id
        #[arg(long)]
        id: Option<String>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Fit and publish a new model from a labeled corpus
    Train {
        /// Corpus file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Abort training after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Measure model accuracy on a labeled corpus
    Evaluate {
        /// Corpus file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,
    },

    /// Copy the current model artifact to another path
    Export {
        /// Destination file for the exported artifact
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate stored test records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose model and configuration health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// A single record object
    Record,
    /// JSON array of records
    Json,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one result per line)
    Ndjson,
    /// JSON array of results
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "gazeqc=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), GazeqcCliError> {
    let config = match &cli.config {
        Some(path) => QualityConfig::from_file(path)?,
        None => QualityConfig::default(),
    };
    let model_path = cli
        .model
        .clone()
        .unwrap_or_else(|| config.resolved_model_path());

    match cli.command {
        Commands::Predict {
            input,
            input_format,
            id,
            output_format,
        } => cmd_predict(
            &input,
            input_format,
            id.as_deref(),
            output_format,
            &model_path,
        ),

        Commands::Train {
            input,
            input_format,
            timeout_secs,
        } => cmd_train(&input, input_format, timeout_secs, &config, &model_path),

        Commands::Evaluate {
            input,
            input_format,
        } => cmd_evaluate(&input, input_format, &model_path),

        Commands::Export { output } => cmd_export(&model_path, &output),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { json } => cmd_doctor(cli.config.as_deref(), &model_path, json),
    }
}

fn cmd_predict(
    input: &Path,
    input_format: InputFormat,
    id: Option<&str>,
    output_format: OutputFormat,
    model_path: &Path,
) -> Result<(), GazeqcCliError> {
    let repository = InMemoryRepository::new(read_records(input, &input_format)?);
    if repository.is_empty() {
        return Err(GazeqcCliError::NoRecords);
    }

    let predictor = Predictor::load_or_default(model_path);

    let records = match id {
        Some(id) => vec![repository.get_test_record(id)?],
        None => repository
            .raw_records()
            .iter()
            .map(RawRecordAdapter::to_test_record)
            .collect::<Result<Vec<_>, _>>()?,
    };

    let results: Vec<PredictionResult> = records.iter().map(|r| predictor.predict(r)).collect();
    print!("{}", format_output(&results, &output_format)?);
    Ok(())
}

fn cmd_train(
    input: &Path,
    input_format: InputFormat,
    timeout_secs: Option<u64>,
    config: &QualityConfig,
    model_path: &Path,
) -> Result<(), GazeqcCliError> {
    let repository = InMemoryRepository::new(read_records(input, &input_format)?);
    let corpus = repository.list_labeled_corpus()?;

    let cancel = match timeout_secs {
        Some(secs) => CancellationToken::with_timeout(Duration::from_secs(secs)),
        None => CancellationToken::new(),
    };

    let (_, report) =
        TrainingLoop::new(config.training.clone()).train(&corpus, model_path, &cancel)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_evaluate(
    input: &Path,
    input_format: InputFormat,
    model_path: &Path,
) -> Result<(), GazeqcCliError> {
    let repository = InMemoryRepository::new(read_records(input, &input_format)?);
    let corpus = repository.list_labeled_corpus()?;

    let predictor = Predictor::load_or_default(model_path);
    let summary = evaluate(&corpus, &predictor);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_export(model_path: &Path, output: &Path) -> Result<(), GazeqcCliError> {
    // A missing or corrupt model is an error here, not a silent default
    let predictor = Predictor::load(model_path)?;
    predictor.export(output)?;

    let artifact = predictor.artifact();
    let summary = serde_json::json!({
        "model_id": artifact.model_id,
        "trained": artifact.is_trained(),
        "output": output.display().to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), GazeqcCliError> {
    let records = read_records(input, &input_format)?;
    let failures = RawRecordAdapter::validate_records(&records);

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - failures.len(),
        invalid_records: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                record_id: f.record_id.clone(),
                error: f.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Record {} (index {}): {}",
                    err.record_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_records > 0 {
        Err(GazeqcCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(
    config_path: Option<&Path>,
    model_path: &Path,
    json: bool,
) -> Result<(), GazeqcCliError> {
    let mut checks: Vec<DoctorCheck> = vec![
        DoctorCheck::ok("gazeqc_version", format!("gazeqc version {}", GAZEQC_VERSION)),
        DoctorCheck::ok("schema_version", format!("Input schema: {}", SCHEMA_VERSION)),
        DoctorCheck::ok("artifact_format", format!("Model format: {}", ARTIFACT_FORMAT)),
    ];

    if let Some(path) = config_path {
        // Already parsed by `run`; reaching here means it is valid
        checks.push(DoctorCheck::ok(
            "config",
            format!("Config file valid: {}", path.display()),
        ));
    }

    checks.push(check_model(model_path));

    let mut lock_name = model_path.as_os_str().to_os_string();
    lock_name.push(".lock");
    if Path::new(&lock_name).exists() {
        checks.push(DoctorCheck {
            name: "training_lock".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "Training lock present at {} (training running, or left by a crashed run)",
                Path::new(&lock_name).display()
            ),
        });
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)".to_string())
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (records can be piped with -i -)".to_string())
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: GAZEQC_VERSION.to_string(),
        model_path: model_path.display().to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("gazeqc Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("Model:    {}", report.model_path);
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
        Err(GazeqcCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_model(model_path: &Path) -> DoctorCheck {
    if !model_path.exists() {
        return DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Warning,
            message: "Model artifact does not exist; predictions use the untrained default model"
                .to_string(),
        };
    }

    match ModelArtifact::load(model_path) {
        Ok(artifact) if artifact.is_trained() => DoctorCheck::ok(
            "model",
            format!(
                "Model {} trained on {} records{}",
                artifact.model_id,
                artifact.training_samples,
                artifact
                    .trained_at
                    .map(|t| format!(" at {}", t.to_rfc3339()))
                    .unwrap_or_default()
            ),
        ),
        Ok(artifact) => DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Warning,
            message: format!("Model {} has not been trained", artifact.model_id),
        },
        Err(e) => DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot load model artifact: {}", e),
        },
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, GazeqcCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_records(
    input: &Path,
    input_format: &InputFormat,
) -> Result<Vec<RawTestRecord>, GazeqcCliError> {
    let input_data = read_input(input)?;
    let records = match input_format {
        InputFormat::Record => vec![RawRecordAdapter::parse_record(&input_data)?],
        InputFormat::Json => RawRecordAdapter::parse_array(&input_data)?,
        InputFormat::Ndjson => RawRecordAdapter::parse_ndjson(&input_data)?,
    };
    Ok(records)
}

fn format_output(
    results: &[PredictionResult],
    format: &OutputFormat,
) -> Result<String, GazeqcCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for result in results {
                lines.push(serde_json::to_string(result)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(results)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(results)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum GazeqcCliError {
    Io(io::Error),
    Quality(QualityError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for GazeqcCliError {
    fn from(e: io::Error) -> Self {
        GazeqcCliError::Io(e)
    }
}

impl From<QualityError> for GazeqcCliError {
    fn from(e: QualityError) -> Self {
        GazeqcCliError::Quality(e)
    }
}

impl From<serde_json::Error> for GazeqcCliError {
    fn from(e: serde_json::Error) -> Self {
        GazeqcCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<GazeqcCliError> for CliError {
    fn from(e: GazeqcCliError) -> Self {
        match e {
            GazeqcCliError::Io(e) => {
                CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions")
            }
            GazeqcCliError::Quality(e) => quality_error(e),
            GazeqcCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            GazeqcCliError::NoRecords => CliError::new(
                "NO_RECORDS",
                "No records found in input".to_string(),
                "Ensure input file is not empty",
            ),
            GazeqcCliError::ValidationFailed(count) => CliError::new(
                "VALIDATION_FAILED",
                format!("{} records failed validation", count),
                "Fix validation errors and retry",
            ),
            GazeqcCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                "Review the doctor report for details",
            ),
        }
    }
}

fn quality_error(e: QualityError) -> CliError {
    let message = e.to_string();
    match e {
        QualityError::InvalidInput(_) => CliError::new(
            "INVALID_INPUT",
            message,
            "Run 'gazeqc validate' for details",
        ),
        QualityError::InsufficientData { .. } => CliError::new(
            "INSUFFICIENT_DATA",
            message,
            "Label more test records before training",
        ),
        QualityError::JsonError(_) => CliError::new("JSON_ERROR", message, "Check JSON syntax"),
        QualityError::IoError(_) => {
            CliError::new("IO_ERROR", message, "Check file paths and permissions")
        }
        QualityError::ArtifactError(_) | QualityError::IncompatibleArtifact { .. } => {
            CliError::new(
                "ARTIFACT_ERROR",
                message,
                "Retrain the model with 'gazeqc train'",
            )
        }
        QualityError::ModelError(_) => CliError::new(
            "MODEL_ERROR",
            message,
            "Run 'gazeqc doctor' to inspect the model",
        ),
        QualityError::TrainingInProgress(_) => CliError::new(
            "TRAINING_IN_PROGRESS",
            message,
            "Wait for the running training to finish, or remove a stale lock file",
        ),
        QualityError::Cancelled { .. } => CliError::new(
            "CANCELLED",
            message,
            "Increase --timeout-secs or reduce training epochs",
        ),
        QualityError::RecordNotFound(_) => {
            CliError::new("RECORD_NOT_FOUND", message, "Check the record id")
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    record_id: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    model_path: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
