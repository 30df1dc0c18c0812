//! Scheduled prognosis run.
//!
//! Reads the day's raw forecast batches, folds them into the stored
//! history, simulates the battery over the configured horizon, and writes
//! the prognosis table. Meant to be run from cron after each fetch.

use chrono::{Local, NaiveDate, Utc};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use solar_prognosis::config::Config;
use solar_prognosis::logging::{self, Stage};
use solar_prognosis::model::{Granularity, PrognosisError};
use solar_prognosis::pipeline;
use solar_prognosis::storage::{self, PrognosisReport};

const DEFAULT_CONFIG: &str = "prognosis.toml";

#[derive(Parser, Debug)]
#[command(name = "solar_prognosis", version, about = "Merge solar forecasts and simulate battery charge")]
struct Cli {
    /// TOML configuration file (falls back to $PROGNOSIS_CONFIG, then ./prognosis.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Raw daily forecast rows (date,time,irradiance_value,irradiance_unit,source)
    #[arg(long)]
    daily: Option<PathBuf>,

    /// Raw hourly forecast rows, same columns as --daily
    #[arg(long)]
    hourly: Option<PathBuf>,

    /// Directory holding the merged daily and hourly history
    #[arg(long, default_value = "data")]
    history_dir: PathBuf,

    /// Prognosis table to write
    #[arg(short, long, default_value = "battery_prognosis.csv")]
    out: PathBuf,

    /// Also write a JSON report with summary totals
    #[arg(long)]
    json: Option<PathBuf>,

    /// Override the current date (YYYY-MM-DD), e.g. to replay an old fetch
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Drop timestamps and targets from console output (interactive runs)
    #[arg(long)]
    plain_console: bool,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("prognosis run failed: {}", e);
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PrognosisError> {
    let config_path = cli
        .config
        .or_else(|| std::env::var_os("PROGNOSIS_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load(&config_path)?;
    logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        !cli.plain_console,
    )?;

    let fetched_at = Utc::now();
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());
    tracing::info!(
        stage = %Stage::Config,
        config = %config_path.display(),
        source = %config.source.name,
        location = %config.source.location,
        %today,
        "starting prognosis run"
    );

    let daily_rows = match &cli.daily {
        Some(path) => storage::read_raw_file(path)?,
        None => Vec::new(),
    };
    let hourly_rows = match &cli.hourly {
        Some(path) => storage::read_raw_file(path)?,
        None => Vec::new(),
    };

    let daily_history = storage::load_history(&cli.history_dir, Granularity::Daily)?;
    let hourly_history = storage::load_history(&cli.history_dir, Granularity::Hourly)?;

    let prognosis = pipeline::run(
        &config,
        &daily_history,
        &hourly_history,
        &daily_rows,
        &hourly_rows,
        fetched_at,
        today,
    )?;

    storage::save_history(&cli.history_dir, &prognosis.daily.series)?;
    storage::save_history(&cli.history_dir, &prognosis.hourly.series)?;
    storage::write_prognosis_file(&cli.out, &prognosis.states)?;

    if let Some(path) = &cli.json {
        let report = PrognosisReport::new(&prognosis.states, today, fetched_at);
        storage::write_report_json(BufWriter::new(File::create(path)?), &report)?;
        tracing::info!(stage = %Stage::Storage, path = %path.display(), "wrote JSON report");
    }

    Ok(())
}
