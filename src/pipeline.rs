/// One scheduled prognosis run, end to end.
///
/// raw rows → normalize → merge into stored history → horizon → simulate.
/// No I/O happens here: the caller loads history and raw batches, and
/// persists what comes back. Keeping the clock (`fetched_at`, `today`) as
/// inputs makes a run reproducible.

use chrono::{DateTime, NaiveDate, Utc};

use crate::analysis::horizon::{build_horizon, build_horizon_with_hourly, ForecastDay};
use crate::analysis::merge::{merge, MergeReport};
use crate::config::Config;
use crate::ingest::normalize::{normalize_batch, RawRow};
use crate::logging;
use crate::model::{BatteryDayState, ObservationSeries, PrognosisError};

/// Outcome of folding one raw batch into a stored series.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub series: ObservationSeries,
    pub report: MergeReport,
    pub discarded: usize,
}

/// Normalizes `rows` and merges the survivors into `existing`.
///
/// Rows are read as belonging to `existing`'s granularity. Malformed rows,
/// including rows whose time field disagrees with that granularity, are
/// dropped; an ambiguous batch fails as a whole and leaves the caller's
/// series as it was.
pub fn ingest_batch(
    existing: &ObservationSeries,
    rows: &[RawRow],
    source: &str,
    fetched_at: DateTime<Utc>,
) -> Result<IngestOutcome, PrognosisError> {
    let batch = normalize_batch(rows, existing.granularity(), source, fetched_at);
    let (series, report) = merge(existing, &batch.records)?;
    logging::log_merge_summary(existing.granularity(), &report, series.len());
    Ok(IngestOutcome {
        series,
        report,
        discarded: batch.discarded,
    })
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Prognosis {
    pub daily: IngestOutcome,
    pub hourly: IngestOutcome,
    pub horizon: Vec<ForecastDay>,
    pub states: Vec<BatteryDayState>,
}

/// Runs the whole chain for one fetch.
///
/// The horizon starts at `today` and spans `simulation.horizon_days`.
pub fn run(
    config: &Config,
    daily_history: &ObservationSeries,
    hourly_history: &ObservationSeries,
    daily_rows: &[RawRow],
    hourly_rows: &[RawRow],
    fetched_at: DateTime<Utc>,
    today: NaiveDate,
) -> Result<Prognosis, PrognosisError> {
    // Fail on configuration before touching any data.
    let simulator = config.simulator()?;
    let source = config.source.name.as_str();

    let daily = ingest_batch(daily_history, daily_rows, source, fetched_at)?;
    let hourly = ingest_batch(hourly_history, hourly_rows, source, fetched_at)?;

    let days = config.simulation.horizon_days;
    let horizon = if config.simulation.hourly_fallback {
        build_horizon_with_hourly(&daily.series, &hourly.series, today, days)
    } else {
        build_horizon(&daily.series, today, days)
    };

    let states = simulator.simulate(&horizon, today)?;
    logging::log_prognosis_summary(&states);

    Ok(Prognosis {
        daily,
        hourly,
        horizon,
        states,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatteryStatus, Granularity};
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn row(date: &str, time: Option<&str>, value: &str, unit: &str) -> RawRow {
        RawRow {
            date: date.to_string(),
            time: time.map(str::to_string),
            irradiance_value: value.to_string(),
            irradiance_unit: unit.to_string(),
            source: "tutiempo.net".to_string(),
        }
    }

    fn config(extra: &str) -> Config {
        Config::from_toml_str(&format!(
            "[battery]\ninitial_soc_percent = 0\n[simulation]\nhorizon_days = 3\n{}",
            extra
        ))
        .unwrap()
    }

    fn fetched() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    #[test]
    fn test_run_produces_one_state_per_horizon_day() {
        let daily_rows = vec![
            row("2025-06-02", None, "1.10", "kWh/m2"),
            row("2025-06-03", None, "1100", "Wh/m2"),
            row("not-a-date", None, "1.0", "kWh/m2"),
        ];
        let prognosis = run(
            &config(""),
            &ObservationSeries::daily(),
            &ObservationSeries::hourly(),
            &daily_rows,
            &[],
            fetched(),
            today(),
        )
        .unwrap();

        assert_eq!(prognosis.daily.discarded, 1);
        assert_eq!(prognosis.daily.report.inserted, 2);
        assert_eq!(prognosis.states.len(), 3);
        assert_eq!(prognosis.states[0].day_label, "Today");
        assert_relative_eq!(prognosis.states[0].charge_energy_kwh, 2.6928, epsilon = 1e-9);
        assert_relative_eq!(prognosis.states[1].battery_energy_kwh, 5.3856, epsilon = 1e-9);
        assert!(prognosis.states[2].forecast_missing);
        assert_eq!(prognosis.states[2].status, BatteryStatus::Idle);
    }

    #[test]
    fn test_hourly_fallback_fills_missing_daily_totals() {
        let hourly_rows = vec![
            row("2025-06-04", Some("11:00"), "400", "W/m2"),
            row("2025-06-04", Some("12:00"), "700", "W/m2"),
        ];
        let prognosis = run(
            &config("hourly_fallback = true\n"),
            &ObservationSeries::daily(),
            &ObservationSeries::hourly(),
            &[],
            &hourly_rows,
            fetched(),
            today(),
        )
        .unwrap();

        assert_eq!(prognosis.hourly.series.granularity(), Granularity::Hourly);
        assert_eq!(prognosis.hourly.series.len(), 2);
        assert_eq!(prognosis.horizon[2].irradiance_kwh_m2, Some(1.1));
        assert!(!prognosis.states[2].forecast_missing);
    }

    #[test]
    fn test_ambiguous_batch_aborts_run_and_keeps_history() {
        let history = ingest_batch(
            &ObservationSeries::daily(),
            &[row("2025-06-02", None, "1.0", "kWh/m2")],
            "tutiempo.net",
            fetched(),
        )
        .unwrap()
        .series;

        let mut other = row("2025-06-03", None, "0.8", "kWh/m2");
        other.source = "other.example".to_string();
        let rows = vec![row("2025-06-03", None, "0.9", "kWh/m2"), other];

        // An empty declared source keeps each row's own source.
        let result = ingest_batch(&history, &rows, "", fetched());
        assert!(matches!(result, Err(PrognosisError::InvalidMerge(_))));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_timed_row_in_daily_stream_is_dropped_and_run_continues() {
        let daily_rows = vec![
            row("2025-06-02", None, "1.10", "kWh/m2"),
            row("2025-06-03", Some("00:00"), "1.20", "kWh/m2"),
        ];
        let hourly_rows = vec![row("2025-06-03", None, "450", "Wh/m2")];
        let prognosis = run(
            &config(""),
            &ObservationSeries::daily(),
            &ObservationSeries::hourly(),
            &daily_rows,
            &hourly_rows,
            fetched(),
            today(),
        )
        .expect("misplaced rows are discarded, not fatal");

        assert_eq!(prognosis.daily.discarded, 1);
        assert_eq!(prognosis.daily.series.len(), 1);
        assert_eq!(prognosis.hourly.discarded, 1);
        assert!(prognosis.hourly.series.is_empty());
        assert_eq!(prognosis.states.len(), 3);
        assert!(prognosis.states[1].forecast_missing);
    }

    #[test]
    fn test_invalid_configuration_fails_before_ingest() {
        let bad = Config::from_toml_str("[battery]\ninitial_soc_percent = 140\n").unwrap();
        let result = run(
            &bad,
            &ObservationSeries::daily(),
            &ObservationSeries::hourly(),
            &[row("2025-06-02", None, "1.1", "kWh/m2")],
            &[],
            fetched(),
            today(),
        );
        assert!(matches!(result, Err(PrognosisError::InvalidConfiguration(_))));
    }
}
