use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{command, Args, Parser, Subcommand};
use covidstats::{
    config::Config,
    filter::{CaseSensitivity, LocationFilter, MatchType},
    formatters::{
        CsvFormatter, JsonFormatter, JsonLinesFormatter, OutputFormatter, OutputGenerator,
    },
    report::{ReportKind, ReportParams, ReportRequest, ReportTable},
    CovidStats, LocationSummary,
};
use enum_dispatch::enum_dispatch;
use futures::future::join_all;
use log::{debug, error, info};
use nonempty::NonEmpty;
use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::{display_locations, display_report, display_reports};
use crate::error::CovidStatsCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const LOADING_STRING: &str = "Loading death and vaccination tables";

/// Defines the output formats we are able to produce reports in.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
    JsonLines,
}

impl OutputFormat {
    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Table | OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::JsonLines => "jsonl",
        }
    }
}

impl From<&OutputFormat> for OutputFormatter {
    fn from(value: &OutputFormat) -> Self {
        match value {
            // Tables written to a file fall back to CSV
            OutputFormat::Table | OutputFormat::Csv => OutputFormatter::Csv(CsvFormatter),
            OutputFormat::Json => OutputFormatter::Json(JsonFormatter),
            OutputFormat::JsonLines => OutputFormatter::JsonLines(JsonLinesFormatter),
        }
    }
}

fn write_output<T, U>(
    output_generator: T,
    mut data: DataFrame,
    output_file: Option<U>,
) -> CovidStatsCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, &mut data)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, &mut data)?;
    };
    Ok(())
}

/// Prints a report as a table or writes it in the requested format.
fn emit_report(
    table: &ReportTable,
    output_format: OutputFormat,
    output_file: Option<&Path>,
    decimal_places: usize,
) -> CovidStatsCliResult<()> {
    match (output_format, output_file) {
        (OutputFormat::Table, None) => display_report(table, decimal_places),
        _ => {
            let formatter: OutputFormatter = (&output_format).into();
            write_output(formatter, table.to_dataframe(decimal_places)?, output_file)?;
        }
    }
    Ok(())
}

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

async fn load(config: Config, quiet: bool) -> CovidStatsCliResult<CovidStats> {
    let sp = start_spinner(quiet, LOADING_STRING);
    let covid_stats = CovidStats::new_with_config(config).await?;
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
    Ok(covid_stats)
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> CovidStatsCliResult<()>;
}

/// The `reports` command lists the available reports.
#[derive(Args, Debug)]
pub struct ReportsCommand {}

impl RunCommand for ReportsCommand {
    async fn run(&self, _config: Config) -> CovidStatsCliResult<()> {
        info!("Running `reports` subcommand");
        display_reports();
        Ok(())
    }
}

#[derive(Debug, Clone, clap::ValueEnum, Copy)]
enum MatchTypeArgs {
    Regex,
    Exact,
    Contains,
    Startswith,
}

impl From<MatchTypeArgs> for MatchType {
    fn from(value: MatchTypeArgs) -> Self {
        match value {
            MatchTypeArgs::Exact => MatchType::Exact,
            MatchTypeArgs::Regex => MatchType::Regex,
            MatchTypeArgs::Contains => MatchType::Contains,
            MatchTypeArgs::Startswith => MatchType::Startswith,
        }
    }
}

#[derive(Debug, Clone, clap::ValueEnum, Copy)]
enum CaseSensitivityArgs {
    Sensitive,
    Insensitive,
}

impl From<CaseSensitivityArgs> for CaseSensitivity {
    fn from(value: CaseSensitivityArgs) -> Self {
        match value {
            CaseSensitivityArgs::Insensitive => CaseSensitivity::Insensitive,
            CaseSensitivityArgs::Sensitive => CaseSensitivity::Sensitive,
        }
    }
}

/// Command-line arguments that select locations.
#[derive(Args, Debug, Clone)]
pub struct LocationArgs {
    #[arg(
        short,
        long,
        help = "Filter by location name; may be repeated to match any of several",
        num_args = 0..
    )]
    location: Vec<String>,
    #[arg(
        value_enum,
        short = 'm',
        long,
        value_name = "MATCH_TYPE",
        help = "Type of matching to perform on the 'location' argument",
        default_value_t = MatchTypeArgs::Exact
    )]
    match_type: MatchTypeArgs,
    #[arg(
        value_enum,
        long,
        value_name = "CASE_SENSITIVITY",
        help = "Type of case sensitivity used in matching on the 'location' argument",
        default_value_t = CaseSensitivityArgs::Insensitive
    )]
    case_sensitivity: CaseSensitivityArgs,
}

impl From<LocationArgs> for LocationFilter {
    fn from(args: LocationArgs) -> Self {
        LocationFilter::new(
            args.location,
            args.match_type.into(),
            args.case_sensitivity.into(),
        )
    }
}

/// The `locations` command lists the locations present in the loaded tables.
#[derive(Args, Debug)]
pub struct LocationsCommand {
    #[command(flatten)]
    location_args: LocationArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for LocationsCommand {
    async fn run(&self, config: Config) -> CovidStatsCliResult<()> {
        info!("Running `locations` subcommand");
        let filter = LocationFilter::from(self.location_args.clone()).compile()?;
        let covid_stats = load(config, self.quiet).await?;
        let locations: Vec<LocationSummary> = covid_stats
            .location_summaries()
            .into_iter()
            .filter(|summary| filter.matches(&summary.location))
            .collect();
        println!("\nThe following {} locations are available:", locations.len());
        display_locations(&locations);
        Ok(())
    }
}

/// The `run` command computes a single report.
#[derive(Args, Debug)]
pub struct RunReportCommand {
    #[arg(index = 1, help = "Name of the report, see the `reports` command")]
    report: ReportKind,
    #[command(flatten)]
    location_args: LocationArgs,
    #[arg(short = 'n', long, help = "Maximum number of rows to output")]
    top: Option<usize>,
    #[arg(long, help = "Phases must last more than this many days")]
    min_days: Option<usize>,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Comma-separated milestone thresholds",
        allow_hyphen_values = true
    )]
    thresholds: Vec<f64>,
    #[arg(
        short = 'f',
        long,
        value_name = "table|csv|json|jsonlines",
        default_value = "table",
        help = "Output format for the report"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the report")]
    output_file: Option<PathBuf>,
    #[arg(from_global)]
    quiet: bool,
}

impl From<&RunReportCommand> for ReportRequest {
    fn from(command: &RunReportCommand) -> Self {
        ReportRequest {
            report: command.report,
            params: ReportParams {
                location: command.location_args.clone().into(),
                top: command.top,
                min_days: command.min_days,
                thresholds: NonEmpty::from_vec(command.thresholds.clone()),
            },
        }
    }
}

impl RunCommand for RunReportCommand {
    async fn run(&self, config: Config) -> CovidStatsCliResult<()> {
        info!("Running `run` subcommand");
        debug!("{:#?}", self);
        let request = ReportRequest::from(self);
        let decimal_places = config.decimal_places;
        let covid_stats = load(config, self.quiet).await?;
        let table = covid_stats.run(&request)?;
        emit_report(
            &table,
            self.output_format,
            self.output_file.as_deref(),
            decimal_places,
        )?;
        Ok(())
    }
}

/// The `batch` command loads a JSON array of report requests and runs them concurrently.
#[derive(Args, Debug)]
pub struct BatchCommand {
    #[arg(index = 1, help = "JSON file containing a list of report requests")]
    batch_file: PathBuf,
    #[arg(
        short = 'f',
        long,
        value_name = "table|csv|json|jsonlines",
        default_value = "table",
        help = "Output format for the reports"
    )]
    output_format: OutputFormat,
    #[arg(
        short = 'o',
        long,
        help = "Directory in which to write one file per report"
    )]
    output_dir: Option<PathBuf>,
    #[arg(from_global)]
    quiet: bool,
}

fn read_batch(path: &Path) -> CovidStatsCliResult<Vec<ReportRequest>> {
    let batch = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch from file: {}", path.display()))?;
    Ok(serde_json::from_str(&batch)?)
}

impl RunCommand for BatchCommand {
    async fn run(&self, config: Config) -> CovidStatsCliResult<()> {
        info!("Running `batch` subcommand");
        let requests = read_batch(&self.batch_file)?;
        let total = requests.len();
        let decimal_places = config.decimal_places;
        let covid_stats = Arc::new(load(config, self.quiet).await?);

        let sp = start_spinner(self.quiet, &format!("Running {total} reports"));
        let results = join_all(requests.into_iter().map(|request| {
            let covid_stats = Arc::clone(&covid_stats);
            tokio::task::spawn_blocking(move || {
                let result = covid_stats.run(&request);
                (request, result)
            })
        }))
        .await;
        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }

        if let Some(dir) = self.output_dir.as_ref() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        let mut failed = 0;
        for (idx, joined) in results.into_iter().enumerate() {
            let (request, result) = joined?;
            let table = match result {
                Ok(table) => table,
                Err(err) => {
                    error!("Report `{}` failed: {err}", request.report);
                    failed += 1;
                    continue;
                }
            };
            match self.output_dir.as_ref() {
                Some(dir) => {
                    let file_name = format!(
                        "{idx:02}-{}.{}",
                        request.report,
                        self.output_format.extension()
                    );
                    emit_report(
                        &table,
                        self.output_format,
                        Some(dir.join(file_name).as_path()),
                        decimal_places,
                    )?;
                }
                None => {
                    println!("\n{}: {}", request.report, request.report.description());
                    emit_report(&table, self.output_format, None, decimal_places)?;
                }
            }
        }
        if failed > 0 {
            return Err(anyhow!("{failed} of {total} reports failed").into());
        }
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, name = "covidstats")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG` is set)\n\
            will still be printed.",
        global = true
    )]
    quiet: bool,
    #[arg(long, help = "Path to the deaths CSV, overriding the config file", global = true)]
    deaths: Option<PathBuf>,
    #[arg(
        long,
        help = "Path to the vaccinations CSV, overriding the config file",
        global = true
    )]
    vaccinations: Option<PathBuf>,
    #[arg(
        long,
        help = "Decimal places shown for floating point values, at most 15",
        global = true
    )]
    decimal_places: Option<usize>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(deaths) = self.deaths.as_ref() {
            config.deaths_path = deaths.clone();
        }
        if let Some(vaccinations) = self.vaccinations.as_ref() {
            config.vaccinations_path = vaccinations.clone();
        }
        if let Some(decimal_places) = self.decimal_places {
            config.decimal_places = decimal_places;
        }
        config
    }
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// List the available reports
    Reports(ReportsCommand),
    /// List locations present in the loaded tables
    Locations(LocationsCommand),
    /// Compute a single report
    Run(RunReportCommand),
    /// Compute every report listed in a JSON batch file
    Batch(BatchCommand),
}
