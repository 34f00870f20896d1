//! Export command implementation

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::{CliError, DatasetsCommand, OrganizationsCommand};
use crate::config::PortalConfig;
use crate::export::{
    EmptyResultPolicy, ExportExecutor, ExportJobRequest, ExportOptions, ExportParams,
    ExportReport, ProgressReporter, RetryPolicy,
};
use crate::fetcher::PortalHttpClient;
use crate::metadata::DatasetCatalog;
use crate::output::csv::CsvTableWriter;
use crate::output::{OutputWriter, TableWriter};
use crate::shutdown::SharedShutdown;
use crate::table::SchemaPolicy;
use crate::ResultDescriptor;

/// Maximum allowed concurrency so a single export cannot flood the portal
const MAX_CONCURRENCY: usize = 32;

/// Try to parse a datetime in RFC3339 form.
///
/// Inputs with an offset are converted to UTC; inputs without one are taken
/// as-is, e.g. `2024-01-01T00:00:00`.
fn try_parse_datetime_rfc3339(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.naive_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.naive_utc());
    }

    None
}

/// Parse a start time from YYYY-MM-DD or RFC3339.
///
/// Date-only input means start of day.
pub fn parse_since(input: &str) -> Result<NaiveDateTime, CliError> {
    if let Some(ts) = try_parse_datetime_rfc3339(input) {
        return Ok(ts);
    }

    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid since: {e}")))?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument("Invalid since".to_string()))
}

/// Parse an end time from YYYY-MM-DD or RFC3339.
///
/// Date-only input means end of day (23:59:59.999) so the date is included.
pub fn parse_until(input: &str) -> Result<NaiveDateTime, CliError> {
    if let Some(ts) = try_parse_datetime_rfc3339(input) {
        return Ok(ts);
    }

    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid until: {e}")))?
        .and_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(|| CliError::InvalidArgument("Invalid until".to_string()))
}

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse a positive number of seconds (fractions allowed).
fn parse_interval(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("interval must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("interval out of range: {e}"))
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Schema reconciliation flag values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaArg {
    /// Union of all columns
    Union,
    /// Same columns within a source type
    Strict,
}

impl From<SchemaArg> for SchemaPolicy {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::Union => SchemaPolicy::Union,
            SchemaArg::Strict => SchemaPolicy::Strict,
        }
    }
}

/// Minder research portal export client
#[derive(Parser, Debug)]
#[command(name = "minder-downloader")]
#[command(about = "Export datasets from the research portal", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (default: $MINDER_DOWNLOADER_HOME/info.yaml, then ./info.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,
}

impl Cli {
    /// Load the portal settings this invocation points at.
    pub fn load_config(&self) -> Result<PortalConfig, CliError> {
        Ok(PortalConfig::discover(self.config.as_deref())?)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export datasets for a time range
    Export(ExportArgs),

    /// List exportable datasets
    Datasets(DatasetsCommand),

    /// List participating organizations
    Organizations(OrganizationsCommand),
}

/// Export command arguments
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Start of the range (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub since: String,

    /// End of the range (YYYY-MM-DD or RFC3339; dates are inclusive)
    #[arg(long)]
    pub until: String,

    /// Dataset to export (repeatable)
    #[arg(long = "dataset", required = true)]
    pub datasets: Vec<String>,

    /// Restrict to an organization (repeatable)
    #[arg(long = "organization")]
    pub organizations: Vec<String>,

    /// Write the consolidated CSV here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Result files downloaded in parallel (default: 1, max: 32)
    #[arg(long, default_value = "1", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Seconds between status polls
    #[arg(long, default_value = "2", value_parser = parse_interval)]
    pub poll_interval: Duration,

    /// Seconds between download retries of the same file
    #[arg(long, default_value = "2", value_parser = parse_interval)]
    pub retry_interval: Duration,

    /// Give up polling after this many polls (default: never)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_poll_attempts: Option<u32>,

    /// Give up on a file after this many download attempts (default: never)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_fetch_attempts: Option<u32>,

    /// How per-file column sets are reconciled
    #[arg(long, value_enum, default_value = "union")]
    pub schema: SchemaArg,

    /// Keep polling when the job finishes without records
    #[arg(long, default_value_t = false)]
    pub keep_polling_on_empty: bool,
}

impl ExportArgs {
    /// Export parameters from the flags.
    pub fn params(&self) -> Result<ExportParams, CliError> {
        let mut params = ExportParams::new(
            parse_since(&self.since)?,
            parse_until(&self.until)?,
            self.datasets.iter().cloned(),
        );
        if !self.organizations.is_empty() {
            params = params.with_organizations(self.organizations.iter().cloned());
        }
        Ok(params)
    }

    /// Executor options from the flags.
    pub fn options(&self) -> ExportOptions {
        let mut poll_policy = RetryPolicy::unbounded(self.poll_interval);
        if let Some(max) = self.max_poll_attempts {
            poll_policy = poll_policy.with_max_attempts(max);
        }

        let mut fetch_policy = RetryPolicy::unbounded(self.retry_interval);
        if let Some(max) = self.max_fetch_attempts {
            fetch_policy = fetch_policy.with_max_attempts(max);
        }

        ExportOptions {
            poll_policy,
            fetch_policy,
            empty_result: if self.keep_polling_on_empty {
                EmptyResultPolicy::KeepPolling
            } else {
                EmptyResultPolicy::Terminal
            },
            schema: self.schema.into(),
            concurrency: self.concurrency,
        }
    }

    /// Run the export and write the table.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let params = self.params()?;
        let config = cli.load_config()?;
        let transport = Arc::new(PortalHttpClient::new(&config)?);

        let catalog = DatasetCatalog::fetch(transport.as_ref(), &config.server).await?;
        let request = ExportJobRequest::build(&params, &catalog)?;

        let progress = Arc::new(BarProgress::new());
        let executor = ExportExecutor::new(transport, &config.server)
            .with_options(self.options())
            .with_progress(progress.clone())
            .with_shutdown(shutdown);

        info!(
            "Starting export of {} from {} to {}",
            request.dataset_names().join(", "),
            request.since(),
            request.until()
        );

        let result = executor.run(&request).await;
        progress.finish();

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                if cli.output_format == OutputFormat::Human {
                    eprintln!("\nExport failed!");
                    eprintln!("Error: {e}");
                }
                error!("Export failed: {}", e);
                return Err(e.into());
            }
        };

        match &self.output {
            Some(path) => {
                let mut writer = CsvTableWriter::new(path)?;
                writer.write_table(&report.table)?;
                writer.close()?;
            }
            None => {
                let stdout = std::io::stdout();
                let mut writer = CsvTableWriter::from_writer(stdout.lock());
                writer.write_table(&report.table)?;
                writer.close()?;
            }
        }

        match cli.output_format {
            OutputFormat::Json => output_json(&report, self.output.as_ref())?,
            OutputFormat::Human => output_human(&report, self.output.as_ref()),
        }
        Ok(())
    }
}

/// Summary as one JSON line; stderr when the table itself went to stdout.
fn output_json(report: &ExportReport, output: Option<&PathBuf>) -> Result<(), CliError> {
    let summary = serde_json::json!({
        "success": true,
        "job_id": report.job.job_id(),
        "files": report.descriptors.len(),
        "rows": report.table.len(),
        "columns": report.table.columns(),
        "fetch_attempts": report.fetch_attempts,
        "header_rows_removed": report.stats.header_rows_removed,
        "output_path": output.map(|p| p.display().to_string()),
    });
    let line = serde_json::to_string(&summary)?;
    if output.is_some() {
        println!("{line}");
    } else {
        eprintln!("{line}");
    }
    Ok(())
}

fn output_human(report: &ExportReport, output: Option<&PathBuf>) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "\nExport completed successfully!");
    let _ = writeln!(err, "Job: {}", report.job);
    if report.table.is_empty() {
        let _ = writeln!(err, "No data in this period");
    } else {
        let _ = writeln!(err, "Files: {}", report.descriptors.len());
        let _ = writeln!(err, "Rows: {}", report.table.len());
    }
    if let Some(path) = output {
        let _ = writeln!(err, "Output: {}", path.display());
    }
    if report.fetch_attempts as usize > report.descriptors.len() {
        let _ = writeln!(
            err,
            "Retries: {}",
            report.fetch_attempts as usize - report.descriptors.len()
        );
    }
}

/// Terminal progress bar over result file downloads.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Hidden until the download stage starts.
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Clear the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarProgress {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ) {
            self.bar.set_style(style.progress_chars("#>-"));
        }
        self.bar.set_message("Downloading result files");
    }

    fn on_item_complete(&self, completed: usize, _total: usize, descriptor: &ResultDescriptor, _rows: usize) {
        self.bar.set_position(completed as u64);
        self.bar.set_message(descriptor.source_type.clone());
    }

    fn on_finish(&self, total_rows: usize) {
        self.bar.set_message(format!("{total_rows} rows"));
    }
}
