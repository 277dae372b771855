//! `facility` command-line front end.
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use facility_common::config::{AppConfig, LogFormat};
use facility_common::error::{AllocationError, AppError};
use facility_common::rules::FacilityConfig;
use facility_common::types::{AllocationRequest, RequestInput};
use facility_engine::{Calculator, CapacityLedger, Preset};
use facility_reports::{Fields, Report, facility_fields, populate_dir, write_term_sheet};

const DEFAULT_LOG_FILTER: &str = "facility_cli=info,facility_engine=info,facility_reports=info";

#[derive(Debug, Parser)]
#[command(name = "facility", version, about = "Rule-based allocation and eligibility calculator")]
pub struct Cli {
    /// Built-in rule table: escrow, credit, bond or business. Falls back to FACILITY_PRESET
    #[arg(long, global = true)]
    pub preset: Option<String>,

    /// JSON rule table, overrides the preset. Falls back to FACILITY_RULES_PATH
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    /// Directory for reports and term sheets. Falls back to FACILITY_OUTPUT_DIR
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate a single request against full configured capacity
    Evaluate {
        #[arg(long)]
        category: String,
        #[arg(long, allow_hyphen_values = true)]
        amount: Decimal,
        /// Collateral, deposit or portfolio value securing the request
        #[arg(long, allow_hyphen_values = true)]
        backing: Option<Decimal>,
        /// Also write a Markdown term sheet to the output directory
        #[arg(long)]
        term_sheet: bool,
    },
    /// Evaluate a JSON array of requests against a shared running total
    Batch {
        #[arg(long)]
        input: PathBuf,
        /// Skip writing the JSON/Markdown report
        #[arg(long)]
        no_report: bool,
    },
    /// Fill placeholders in every Markdown document of a directory
    Populate {
        #[arg(long)]
        dir: PathBuf,
        /// JSON object of extra placeholder values
        #[arg(long)]
        fields: Option<PathBuf>,
    },
    /// Print the active rule table
    Config,
}

/// Configuration after merging flags over the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub facility: FacilityConfig,
    pub output_dir: PathBuf,
}

impl Settings {
    pub fn resolve(cli: &Cli, env: &AppConfig) -> Result<Self, AppError> {
        let rules_path = cli.rules.as_ref().or(env.rules_path.as_ref());
        let facility = match rules_path {
            Some(path) => FacilityConfig::from_json_file(path)?,
            None => {
                let preset: Preset = cli.preset.as_deref().unwrap_or(&env.preset).parse()?;
                let config = preset.config();
                config.validate()?;
                config
            }
        };

        Ok(Self {
            facility,
            output_dir: cli
                .output_dir
                .clone()
                .unwrap_or_else(|| env.output_dir.clone()),
        })
    }
}

/// Install the global tracing subscriber, writing to stderr.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Execute one command, writing its JSON output to `out`.
pub fn run(cli: Cli, env: &AppConfig, out: &mut dyn Write) -> Result<(), AppError> {
    let settings = Settings::resolve(&cli, env)?;
    tracing::info!(
        facility = %settings.facility.name,
        version = %settings.facility.version,
        categories = settings.facility.categories.len(),
        "Facility configuration loaded"
    );

    let calculator = Calculator::new(Arc::new(settings.facility.clone()));

    match cli.command {
        Command::Evaluate {
            category,
            amount,
            backing,
            term_sheet,
        } => {
            let request = AllocationRequest::new(category, amount, backing)?;
            let result = calculator.evaluate(&request)?;
            let term_sheet = if term_sheet {
                Some(write_term_sheet(&settings.output_dir, &result, calculator.config())?)
            } else {
                None
            };
            emit(out, &json!({ "result": result, "term_sheet": term_sheet }))
        }
        Command::Batch { input, no_report } => {
            let requests = read_requests(&input, &calculator)?;
            let ledger = CapacityLedger::new(calculator);

            let mut results = Vec::with_capacity(requests.len());
            for request in &requests {
                results.push(ledger.allocate(request)?);
            }
            let snapshot = ledger.snapshot();

            let mut written = Vec::new();
            if !no_report {
                let report = Report::new(
                    ledger.calculator().config(),
                    results.clone(),
                    Some(snapshot.clone()),
                )?;
                written.push(report.write_json(&settings.output_dir, "allocation_report")?);
                written.push(report.write_markdown(&settings.output_dir, "allocation_report")?);
            }

            emit(
                out,
                &json!({ "results": results, "ledger": snapshot, "reports": written }),
            )
        }
        Command::Populate { dir, fields } => {
            let mut all_fields = facility_fields(calculator.config());
            if let Some(path) = fields {
                all_fields.extend(read_fields(&path)?);
            }
            let summary = populate_dir(&dir, &all_fields)?;
            emit(out, &summary)
        }
        Command::Config => emit(out, calculator.config()),
    }
}

/// Parse and validate every request before any is evaluated.
fn read_requests(path: &Path, calculator: &Calculator) -> Result<Vec<AllocationRequest>, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    let inputs: Vec<RequestInput> = serde_json::from_str(&raw)?;

    inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| -> Result<AllocationRequest, AppError> {
            let at_index = |e: AllocationError| match e {
                AllocationError::InvalidRequest(msg) => {
                    AllocationError::InvalidRequest(format!("request #{index}: {msg}"))
                }
                other => other,
            };
            let request = AllocationRequest::try_from(input).map_err(at_index)?;
            calculator.validate(&request).map_err(at_index)?;
            Ok(request)
        })
        .collect()
}

fn read_fields(path: &Path) -> Result<Fields, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    let fields: BTreeMap<String, String> = serde_json::from_str(&raw)?;
    Ok(fields)
}

fn emit<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<(), AppError> {
    let body = serde_json::to_string_pretty(value)?;
    writeln!(out, "{body}").map_err(|e| AppError::io("<stdout>", e))
}
