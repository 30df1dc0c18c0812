/// Core data types for the solar prognosis service.
///
/// This module defines the shared domain model imported by all other modules:
/// canonical irradiance observations, the keyed series they are merged into,
/// the per-day battery states the simulator emits, and the error taxonomy.
/// It contains no I/O.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Watt-hours per kilowatt-hour.
pub const WH_PER_KWH: f64 = 1000.0;

/// Watt-hours per megajoule (1 MJ = 1e6 J, 1 Wh = 3600 J).
pub const WH_PER_MJ: f64 = 1_000_000.0 / 3600.0;

/// Sampling interval of hourly power-flux readings, in hours.
pub const HOURLY_SAMPLE_HOURS: f64 = 1.0;

/// Tolerance used when classifying a battery as full or empty, in kWh.
pub const ENERGY_EPSILON_KWH: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Observation types
// ---------------------------------------------------------------------------

/// Whether an observation covers a whole day or a single hour slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Daily,
    Hourly,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Daily => write!(f, "daily"),
            Granularity::Hourly => write!(f, "hourly"),
        }
    }
}

/// The identity of an observation within a series.
///
/// Daily records are keyed by `date` alone (`time` is `None`); hourly
/// records by `(date, time)`. The derived ordering sorts by date first,
/// then by time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationKey {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(t) => write!(f, "{} {}", self.date, t.format("%H:%M")),
            None => write!(f, "{}", self.date),
        }
    }
}

/// A single canonical irradiance observation.
///
/// Produced by `ingest::normalize` from a raw parsed row. Irradiance is
/// always stored in Wh/m²; use [`ObservationRecord::irradiance_kwh_m2`]
/// for the display unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub date: NaiveDate,
    /// Present only for hourly observations.
    pub time: Option<NaiveTime>,
    pub irradiance_wh_m2: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl ObservationRecord {
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            date: self.date,
            time: self.time,
        }
    }

    pub fn granularity(&self) -> Granularity {
        if self.time.is_some() {
            Granularity::Hourly
        } else {
            Granularity::Daily
        }
    }

    pub fn irradiance_kwh_m2(&self) -> f64 {
        self.irradiance_wh_m2 / WH_PER_KWH
    }
}

/// An ordered, duplicate-free series of observations of one granularity.
///
/// Records are strictly increasing by key. Series are treated as immutable
/// snapshots: `analysis::merge` returns a new series rather than editing
/// an existing one.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSeries {
    granularity: Granularity,
    records: Vec<ObservationRecord>,
}

/// A series of daily totals, keyed by date.
pub type DailySeries = ObservationSeries;

/// A series of hourly detail readings, keyed by (date, time).
pub type HourlySeries = ObservationSeries;

impl ObservationSeries {
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            records: Vec::new(),
        }
    }

    pub fn daily() -> Self {
        Self::empty(Granularity::Daily)
    }

    pub fn hourly() -> Self {
        Self::empty(Granularity::Hourly)
    }

    /// Builds a series from records that are already strictly ordered and
    /// unique by key.
    ///
    /// Returns `InvalidMerge` if any record has the wrong granularity or the
    /// keys are not strictly increasing.
    pub fn from_sorted(
        granularity: Granularity,
        records: Vec<ObservationRecord>,
    ) -> Result<Self, PrognosisError> {
        let series = Self {
            granularity,
            records,
        };
        series.validate()?;
        Ok(series)
    }

    /// Checks the series invariants: one granularity, strictly increasing keys.
    pub fn validate(&self) -> Result<(), PrognosisError> {
        for record in &self.records {
            if record.granularity() != self.granularity {
                return Err(PrognosisError::InvalidMerge(format!(
                    "{} record {} in a {} series",
                    record.granularity(),
                    record.key(),
                    self.granularity
                )));
            }
        }
        for pair in self.records.windows(2) {
            if pair[0].key() >= pair[1].key() {
                return Err(PrognosisError::InvalidMerge(format!(
                    "keys not strictly increasing: {} then {}",
                    pair[0].key(),
                    pair[1].key()
                )));
            }
        }
        Ok(())
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn records(&self) -> &[ObservationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &ObservationKey) -> Option<&ObservationRecord> {
        self.records
            .binary_search_by(|r| r.key().cmp(key))
            .ok()
            .map(|i| &self.records[i])
    }

    /// Looks up the daily record for `date`.
    pub fn for_date(&self, date: NaiveDate) -> Option<&ObservationRecord> {
        self.get(&ObservationKey { date, time: None })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.records.iter()
    }
}

// ---------------------------------------------------------------------------
// Battery output types
// ---------------------------------------------------------------------------

/// Per-day classification of the battery after that day's transition.
///
/// This is a report, not simulator mode: the simulator carries only the
/// stored energy from one day to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    Charging,
    Discharging,
    Idle,
    Full,
    Empty,
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatteryStatus::Charging => write!(f, "Charging"),
            BatteryStatus::Discharging => write!(f, "Discharging"),
            BatteryStatus::Idle => write!(f, "Idle"),
            BatteryStatus::Full => write!(f, "Full"),
            BatteryStatus::Empty => write!(f, "Empty"),
        }
    }
}

/// Which physical limit set the day's maximum chargeable energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeLimit {
    /// Remaining headroom in the battery. Also reported on ties.
    Capacity,
    /// Charger rate × charge window.
    ChargeRate,
    /// Energy generated by the panels that day.
    Generation,
}

impl fmt::Display for ChargeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargeLimit::Capacity => write!(f, "capacity"),
            ChargeLimit::ChargeRate => write!(f, "charge rate"),
            ChargeLimit::Generation => write!(f, "generation"),
        }
    }
}

/// The simulated battery state at the end of one forecast day.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryDayState {
    pub date: NaiveDate,
    /// "Today", "Tomorrow", or the weekday name.
    pub day_label: String,
    pub solar_radiation_kwh_m2: f64,
    pub generated_energy_kwh: f64,
    pub charge_energy_kwh: f64,
    pub discharge_energy_kwh: f64,
    pub soc_percent: f64,
    pub battery_energy_kwh: f64,
    pub status: BatteryStatus,
    pub charge_limit: ChargeLimit,
    /// The day had no forecast and was simulated with zero generation.
    pub forecast_missing: bool,
    /// The end-of-day energy had to be clamped into `[0, capacity]`.
    pub clamped: bool,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while normalizing, merging, or simulating.
///
/// A missing forecast day is deliberately not an error: it surfaces as
/// `None` in the horizon and is resolved by the simulator's gap policy.
#[derive(Debug, Error)]
pub enum PrognosisError {
    /// A raw row could not be turned into a canonical observation.
    /// Callers discard the row and continue with the batch.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    /// The incoming batch is ambiguous or violates series invariants.
    /// The whole batch is rejected.
    #[error("Invalid merge: {0}")]
    InvalidMerge(String),
    /// A panel, battery, or simulation parameter is non-physical.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
