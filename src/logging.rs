/// Structured logging for the solar prognosis service
///
/// Installs a `tracing` subscriber that writes to the console and,
/// optionally, appends to a log file for scheduled (cron) runs. Core
/// modules log through the `tracing` macros with a `stage` field naming
/// the pipeline step; the helpers below cover the recurring summaries.

use serde::Deserialize;
use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::analysis::merge::MergeReport;
use crate::model::{BatteryDayState, Granularity, PrognosisError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Merge,
    Horizon,
    Battery,
    Storage,
    Config,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Normalize => write!(f, "NORM"),
            Stage::Merge => write!(f, "MERGE"),
            Stage::Horizon => write!(f, "HRZN"),
            Stage::Battery => write!(f, "BATT"),
            Stage::Storage => write!(f, "STORE"),
            Stage::Config => write!(f, "CFG"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber Setup
// ---------------------------------------------------------------------------

/// Initialize the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `min_level`. With
/// `console_timestamps` off the console output drops the time and target
/// for interactive runs; the file layer always carries full timestamps.
/// Calling this twice leaves the first subscriber in place.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> Result<(), PrognosisError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.directive()));

    let console: Box<dyn Layer<Registry> + Send + Sync> = if console_timestamps {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
            .boxed()
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(filter)
        .try_init()
    {
        eprintln!("Logger already initialized: {}", e);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Structured Helpers
// ---------------------------------------------------------------------------

/// Log a raw row that was dropped during normalization.
pub fn log_discarded_row(source: &str, row_index: usize, err: &PrognosisError) {
    tracing::warn!(
        stage = %Stage::Normalize,
        source,
        row = row_index,
        "discarding row: {}",
        err
    );
}

/// Log the outcome of merging one batch into a stored series.
pub fn log_merge_summary(granularity: Granularity, report: &MergeReport, series_len: usize) {
    let message = format!(
        "{} merge: {} inserted, {} replaced, {} stale ignored ({} records total)",
        granularity, report.inserted, report.replaced, report.kept_existing, series_len
    );

    if report.inserted == 0 && report.replaced == 0 && report.kept_existing > 0 {
        tracing::warn!(stage = %Stage::Merge, "{}", message);
    } else {
        tracing::info!(stage = %Stage::Merge, "{}", message);
    }
}

/// Log one line per simulated day.
pub fn log_prognosis_summary(states: &[BatteryDayState]) {
    for state in states {
        let gap = if state.forecast_missing { " (no forecast)" } else { "" };
        tracing::info!(
            stage = %Stage::Battery,
            "{} {:<9} {:.3} kWh/m2 -> {:.2} kWh generated, +{:.2}/-{:.2} kWh, SOC {:.1}% [{}]{}",
            state.date,
            state.day_label,
            state.solar_radiation_kwh_m2,
            state.generated_energy_kwh,
            state.charge_energy_kwh,
            state.discharge_energy_kwh,
            state.soc_percent,
            state.status,
            gap
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_log_level_directives_are_valid_filters() {
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert!(
                EnvFilter::try_new(level.directive()).is_ok(),
                "directive for {} should parse",
                level
            );
        }
    }

    #[test]
    fn test_plain_console_logger_installs() {
        assert!(init_logger(LogLevel::Warn, None, false).is_ok());
        // A second call keeps the first subscriber and still succeeds.
        assert!(init_logger(LogLevel::Debug, None, true).is_ok());
    }

    #[test]
    fn test_stage_tags_are_short_and_distinct() {
        let tags: Vec<String> = [
            Stage::Normalize,
            Stage::Merge,
            Stage::Horizon,
            Stage::Battery,
            Stage::Storage,
            Stage::Config,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let unique: std::collections::HashSet<_> = tags.iter().collect();
        assert_eq!(unique.len(), tags.len());
        assert!(tags.iter().all(|t| t.len() <= 5));
    }
}
