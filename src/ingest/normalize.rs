/// Raw forecast row normalization
///
/// The fetcher/parser hands over rows exactly as they appear in the source
/// table: date and time as text, a numeric value, and the unit printed next
/// to it. This module turns each row into a canonical `ObservationRecord`
/// with irradiance in Wh/m², or rejects it as malformed.
///
/// Accepted units: kWh/m², Wh/m², MJ/m² (energy per area), and W/m² (hourly
/// power flux, integrated over the one-hour sampling interval).

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::logging;
use crate::model::{
    Granularity, ObservationRecord, PrognosisError, HOURLY_SAMPLE_HOURS, WH_PER_KWH, WH_PER_MJ,
};

// ============================================================================
// Raw Row
// ============================================================================

/// One row as supplied by the fetcher/parser.
///
/// Field names match the raw batch CSV columns
/// (`date,time,irradiance_value,irradiance_unit,source`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRow {
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    pub irradiance_value: String,
    pub irradiance_unit: String,
    pub source: String,
}

/// Units the source page is known to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrradianceUnit {
    WhPerM2,
    KwhPerM2,
    MjPerM2,
    /// Instantaneous power flux; only meaningful for hourly rows.
    WPerM2,
}

impl IrradianceUnit {
    /// Parses unit spellings such as `kWh/m²`, `kwh/m2`, `Wh m2`, `W/m²`.
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .trim()
            .to_lowercase()
            .replace('²', "2")
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '/')
            .collect();

        match compact.as_str() {
            "whm2" => Some(IrradianceUnit::WhPerM2),
            "kwhm2" => Some(IrradianceUnit::KwhPerM2),
            "mjm2" => Some(IrradianceUnit::MjPerM2),
            "wm2" => Some(IrradianceUnit::WPerM2),
            _ => None,
        }
    }

    /// Converts `value` in this unit to Wh/m².
    ///
    /// Returns `None` for W/m² on a daily row.
    pub fn to_wh_m2(self, value: f64, granularity: Granularity) -> Option<f64> {
        match (self, granularity) {
            (IrradianceUnit::WhPerM2, _) => Some(value),
            (IrradianceUnit::KwhPerM2, _) => Some(value * WH_PER_KWH),
            (IrradianceUnit::MjPerM2, _) => Some(value * WH_PER_MJ),
            (IrradianceUnit::WPerM2, Granularity::Hourly) => Some(value * HOURLY_SAMPLE_HOURS),
            (IrradianceUnit::WPerM2, Granularity::Daily) => None,
        }
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalizes one raw row into a canonical observation.
///
/// `granularity` is the stream the row arrived in: daily rows must leave
/// `time` blank, hourly rows must fill it in. Fails with `MalformedRecord`
/// on a missing or invalid date, a time that disagrees with the stream, an
/// unparseable time of day, an unknown unit, a non-finite or negative
/// value, or a W/m² reading on a daily row.
pub fn normalize(
    row: &RawRow,
    granularity: Granularity,
    source: &str,
    fetched_at: DateTime<Utc>,
) -> Result<ObservationRecord, PrognosisError> {
    let date = parse_date(&row.date)?;

    let time = match (row.time.as_deref().map(str::trim), granularity) {
        (None | Some(""), Granularity::Daily) => None,
        (Some(t), Granularity::Hourly) if !t.is_empty() => Some(parse_time(t)?),
        (Some(t), Granularity::Daily) => {
            return Err(PrognosisError::MalformedRecord(format!(
                "time '{}' on {} in the daily stream",
                t, row.date
            )));
        }
        (_, Granularity::Hourly) => {
            return Err(PrognosisError::MalformedRecord(format!(
                "missing time on {} in the hourly stream",
                row.date
            )));
        }
    };

    let value: f64 = row.irradiance_value.trim().parse().map_err(|_| {
        PrognosisError::MalformedRecord(format!(
            "irradiance value '{}' on {} is not a number",
            row.irradiance_value, row.date
        ))
    })?;
    if !value.is_finite() {
        return Err(PrognosisError::MalformedRecord(format!(
            "irradiance value on {} is not finite",
            row.date
        )));
    }
    if value < 0.0 {
        return Err(PrognosisError::MalformedRecord(format!(
            "negative irradiance {} on {}",
            value, row.date
        )));
    }

    let unit = IrradianceUnit::parse(&row.irradiance_unit).ok_or_else(|| {
        PrognosisError::MalformedRecord(format!(
            "unknown irradiance unit '{}' on {}",
            row.irradiance_unit, row.date
        ))
    })?;
    let irradiance_wh_m2 = unit.to_wh_m2(value, granularity).ok_or_else(|| {
        PrognosisError::MalformedRecord(format!(
            "power flux unit '{}' on daily row {} has no daily total",
            row.irradiance_unit, row.date
        ))
    })?;

    // The declared batch source wins over whatever the row claims, unless
    // the batch was declared anonymously.
    let source = if source.trim().is_empty() {
        row.source.trim()
    } else {
        source.trim()
    };

    Ok(ObservationRecord {
        date,
        time,
        irradiance_wh_m2,
        source: source.to_string(),
        fetched_at,
    })
}

/// Outcome of normalizing a whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<ObservationRecord>,
    pub discarded: usize,
}

/// Normalizes every row of one stream, discarding (and logging) malformed
/// rows.
///
/// A malformed row never aborts the batch.
pub fn normalize_batch(
    rows: &[RawRow],
    granularity: Granularity,
    source: &str,
    fetched_at: DateTime<Utc>,
) -> NormalizedBatch {
    let mut records = Vec::with_capacity(rows.len());
    let mut discarded = 0;

    for (index, row) in rows.iter().enumerate() {
        match normalize(row, granularity, source, fetched_at) {
            Ok(record) => records.push(record),
            Err(err) => {
                discarded += 1;
                logging::log_discarded_row(source, index, &err);
            }
        }
    }

    tracing::debug!(
        stage = %logging::Stage::Normalize,
        source,
        %granularity,
        accepted = records.len(),
        discarded,
        "normalized batch"
    );

    NormalizedBatch { records, discarded }
}

fn parse_date(raw: &str) -> Result<NaiveDate, PrognosisError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PrognosisError::MalformedRecord("missing date".to_string()));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| PrognosisError::MalformedRecord(format!("invalid date '{}'", trimmed)))
}

fn parse_time(raw: &str) -> Result<NaiveTime, PrognosisError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| PrognosisError::MalformedRecord(format!("invalid time of day '{}'", raw)))
}

// ============================================================================
// Tests
// ============================================================================
