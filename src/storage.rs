/// Tabular persistence for forecasts and prognoses
///
/// Three CSV layouts are produced: the prognosis table the dashboard reads,
/// the daily forecast history, and the hourly forecast history. The history
/// files are read back on the next run so a fresh fetch can be merged into
/// them. Every writer and reader is generic over `io::Write` / `io::Read`;
/// the `*_file` helpers add paths on top.
///
/// Dates are `YYYY-MM-DD`, times `HH:MM:SS`, retrieval timestamps RFC 3339.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::analysis::merge::merge;
use crate::ingest::normalize::RawRow;
use crate::logging::Stage;
use crate::model::{
    BatteryDayState, Granularity, ObservationRecord, ObservationSeries, PrognosisError, WH_PER_KWH,
};

// ---------------------------------------------------------------------------
// Column layouts
// ---------------------------------------------------------------------------

pub const PROGNOSIS_COLUMNS: [&str; 8] = [
    "Date",
    "DayName",
    "SolarRadiation_kWh_m2",
    "ChargeEnergy_kWh",
    "DischargeEnergy_kWh",
    "BatterySOC_percent",
    "BatteryEnergy_kWh",
    "Status",
];

pub const DAILY_COLUMNS: [&str; 4] = ["Date", "SolarRadiation_kWh_m2", "Source", "FetchedAt"];

pub const HOURLY_COLUMNS: [&str; 5] = ["Date", "Time", "SolarRadiation_Wh_m2", "Source", "FetchedAt"];

/// One line of the prognosis table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrognosisRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "DayName")]
    pub day_name: String,
    #[serde(rename = "SolarRadiation_kWh_m2")]
    pub solar_radiation_kwh_m2: f64,
    #[serde(rename = "ChargeEnergy_kWh")]
    pub charge_energy_kwh: f64,
    #[serde(rename = "DischargeEnergy_kWh")]
    pub discharge_energy_kwh: f64,
    #[serde(rename = "BatterySOC_percent")]
    pub battery_soc_percent: f64,
    #[serde(rename = "BatteryEnergy_kWh")]
    pub battery_energy_kwh: f64,
    #[serde(rename = "Status")]
    pub status: String,
}

impl From<&BatteryDayState> for PrognosisRow {
    fn from(state: &BatteryDayState) -> Self {
        Self {
            date: state.date,
            day_name: state.day_label.clone(),
            solar_radiation_kwh_m2: round_to(state.solar_radiation_kwh_m2, 3),
            charge_energy_kwh: round_to(state.charge_energy_kwh, 3),
            discharge_energy_kwh: round_to(state.discharge_energy_kwh, 3),
            battery_soc_percent: round_to(state.soc_percent, 2),
            battery_energy_kwh: round_to(state.battery_energy_kwh, 3),
            status: state.status.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DailyRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "SolarRadiation_kWh_m2")]
    solar_radiation_kwh_m2: f64,
    #[serde(rename = "Source")]
    source: String,
    #[serde(rename = "FetchedAt")]
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HourlyRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Time")]
    time: NaiveTime,
    #[serde(rename = "SolarRadiation_Wh_m2")]
    solar_radiation_wh_m2: f64,
    #[serde(rename = "Source")]
    source: String,
    #[serde(rename = "FetchedAt")]
    fetched_at: DateTime<Utc>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Writes the prognosis table. The header is written even for an empty run.
pub fn write_prognosis<W: io::Write>(writer: W, states: &[BatteryDayState]) -> Result<(), PrognosisError> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(PROGNOSIS_COLUMNS)?;
    for state in states {
        csv.serialize(PrognosisRow::from(state))?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes a daily or hourly series in its history layout.
pub fn write_series<W: io::Write>(writer: W, series: &ObservationSeries) -> Result<(), PrognosisError> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

    match series.granularity() {
        Granularity::Daily => {
            csv.write_record(DAILY_COLUMNS)?;
            for record in series.iter() {
                csv.serialize(DailyRow {
                    date: record.date,
                    solar_radiation_kwh_m2: record.irradiance_kwh_m2(),
                    source: record.source.clone(),
                    fetched_at: record.fetched_at,
                })?;
            }
        }
        Granularity::Hourly => {
            csv.write_record(HOURLY_COLUMNS)?;
            for record in series.iter() {
                let Some(time) = record.time else {
                    return Err(PrognosisError::InvalidMerge(format!(
                        "daily record {} in an hourly series",
                        record.key()
                    )));
                };
                csv.serialize(HourlyRow {
                    date: record.date,
                    time,
                    solar_radiation_wh_m2: record.irradiance_wh_m2,
                    source: record.source.clone(),
                    fetched_at: record.fetched_at,
                })?;
            }
        }
    }

    csv.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Reads a history file back into a series.
///
/// Rows go through the same merge as a fresh batch, so a file with
/// duplicate keys from one source still loads, while conflicting sources
/// are rejected with `InvalidMerge`.
pub fn read_series<R: io::Read>(
    reader: R,
    granularity: Granularity,
) -> Result<ObservationSeries, PrognosisError> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut records = Vec::new();

    match granularity {
        Granularity::Daily => {
            for row in csv.deserialize::<DailyRow>() {
                let row = row?;
                records.push(ObservationRecord {
                    date: row.date,
                    time: None,
                    irradiance_wh_m2: row.solar_radiation_kwh_m2 * WH_PER_KWH,
                    source: row.source,
                    fetched_at: row.fetched_at,
                });
            }
        }
        Granularity::Hourly => {
            for row in csv.deserialize::<HourlyRow>() {
                let row = row?;
                records.push(ObservationRecord {
                    date: row.date,
                    time: Some(row.time),
                    irradiance_wh_m2: row.solar_radiation_wh_m2,
                    source: row.source,
                    fetched_at: row.fetched_at,
                });
            }
        }
    }

    let (series, _) = merge(&ObservationSeries::empty(granularity), &records)?;
    Ok(series)
}

/// Reads a raw batch with columns `date,time,irradiance_value,irradiance_unit,source`.
pub fn read_raw_rows<R: io::Read>(reader: R) -> Result<Vec<RawRow>, PrognosisError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for row in csv.deserialize::<RawRow>() {
        rows.push(row?);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Location of the stored history for one granularity inside `dir`.
pub fn history_path(dir: &Path, granularity: Granularity) -> PathBuf {
    match granularity {
        Granularity::Daily => dir.join("solar_daily.csv"),
        Granularity::Hourly => dir.join("solar_hourly.csv"),
    }
}

/// Loads stored history, or an empty series when nothing was stored yet.
pub fn load_history(dir: &Path, granularity: Granularity) -> Result<ObservationSeries, PrognosisError> {
    let path = history_path(dir, granularity);
    if !path.exists() {
        tracing::info!(stage = %Stage::Storage, path = %path.display(), "no stored history, starting empty");
        return Ok(ObservationSeries::empty(granularity));
    }
    let series = read_series(BufReader::new(File::open(&path)?), granularity)?;
    tracing::debug!(stage = %Stage::Storage, path = %path.display(), records = series.len(), "loaded history");
    Ok(series)
}

pub fn save_history(dir: &Path, series: &ObservationSeries) -> Result<PathBuf, PrognosisError> {
    std::fs::create_dir_all(dir)?;
    let path = history_path(dir, series.granularity());
    write_series(BufWriter::new(File::create(&path)?), series)?;
    tracing::info!(stage = %Stage::Storage, path = %path.display(), records = series.len(), "saved history");
    Ok(path)
}

pub fn read_raw_file(path: &Path) -> Result<Vec<RawRow>, PrognosisError> {
    read_raw_rows(BufReader::new(File::open(path)?))
}

pub fn write_prognosis_file(path: &Path, states: &[BatteryDayState]) -> Result<(), PrognosisError> {
    write_prognosis(BufWriter::new(File::create(path)?), states)?;
    tracing::info!(stage = %Stage::Storage, path = %path.display(), days = states.len(), "wrote prognosis");
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrognosisReport {
    pub generated_at: DateTime<Utc>,
    pub today: NaiveDate,
    pub summary: PrognosisSummary,
    pub days: Vec<PrognosisRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrognosisSummary {
    pub days: usize,
    pub days_without_forecast: usize,
    pub clamped_days: usize,
    pub total_generated_kwh: f64,
    pub total_charge_kwh: f64,
    pub total_discharge_kwh: f64,
    pub final_soc_percent: Option<f64>,
}

impl PrognosisReport {
    pub fn new(states: &[BatteryDayState], today: NaiveDate, generated_at: DateTime<Utc>) -> Self {
        let summary = PrognosisSummary {
            days: states.len(),
            days_without_forecast: states.iter().filter(|s| s.forecast_missing).count(),
            clamped_days: states.iter().filter(|s| s.clamped).count(),
            total_generated_kwh: round_to(states.iter().map(|s| s.generated_energy_kwh).sum(), 3),
            total_charge_kwh: round_to(states.iter().map(|s| s.charge_energy_kwh).sum(), 3),
            total_discharge_kwh: round_to(states.iter().map(|s| s.discharge_energy_kwh).sum(), 3),
            final_soc_percent: states.last().map(|s| round_to(s.soc_percent, 2)),
        };
        Self {
            generated_at,
            today,
            summary,
            days: states.iter().map(PrognosisRow::from).collect(),
        }
    }
}

pub fn write_report_json<W: io::Write>(writer: W, report: &PrognosisReport) -> Result<(), PrognosisError> {
    serde_json::to_writer_pretty(writer, report).map_err(io::Error::from)?;
    Ok(())
}
