//! Forecast horizon construction.
//!
//! Lays the merged daily series onto a contiguous run of calendar days so
//! the simulator sees every date in the planning window, including dates
//! the forecast did not cover. Such dates carry `None` and are resolved by
//! the simulator's `GapPolicy`.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};

use crate::model::{Granularity, ObservationSeries, WH_PER_KWH};

/// One calendar day of the planning horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastDay {
    pub date: NaiveDate,
    /// Daily irradiance total, or `None` when no forecast covers this date.
    pub irradiance_kwh_m2: Option<f64>,
}

impl ForecastDay {
    pub fn new(date: NaiveDate, irradiance_kwh_m2: f64) -> Self {
        Self {
            date,
            irradiance_kwh_m2: Some(irradiance_kwh_m2),
        }
    }

    pub fn gap(date: NaiveDate) -> Self {
        Self {
            date,
            irradiance_kwh_m2: None,
        }
    }
}

/// Builds `days` consecutive forecast days starting at `start` from a daily
/// series.
pub fn build_horizon(daily: &ObservationSeries, start: NaiveDate, days: u32) -> Vec<ForecastDay> {
    calendar(start, days)
        .map(|date| ForecastDay {
            date,
            irradiance_kwh_m2: daily.for_date(date).map(|r| r.irradiance_kwh_m2()),
        })
        .collect()
}

/// Like [`build_horizon`], but fills dates missing from the daily series
/// with the sum of that date's hourly readings, when there are any.
pub fn build_horizon_with_hourly(
    daily: &ObservationSeries,
    hourly: &ObservationSeries,
    start: NaiveDate,
    days: u32,
) -> Vec<ForecastDay> {
    let hourly_totals = daily_totals_from_hourly(hourly);

    build_horizon(daily, start, days)
        .into_iter()
        .map(|day| match day.irradiance_kwh_m2 {
            Some(_) => day,
            None => match hourly_totals.get(&day.date) {
                Some(wh) => {
                    tracing::debug!(
                        stage = %crate::logging::Stage::Horizon,
                        date = %day.date,
                        "daily total missing, using hourly sum"
                    );
                    ForecastDay::new(day.date, wh / WH_PER_KWH)
                }
                None => day,
            },
        })
        .collect()
}

/// Sums hourly Wh/m² readings per date.
///
/// Returns an empty map for a series that is not hourly.
pub fn daily_totals_from_hourly(hourly: &ObservationSeries) -> BTreeMap<NaiveDate, f64> {
    let mut totals = BTreeMap::new();
    if hourly.granularity() != Granularity::Hourly {
        return totals;
    }
    for record in hourly.iter() {
        *totals.entry(record.date).or_insert(0.0) += record.irradiance_wh_m2;
    }
    totals
}

fn calendar(start: NaiveDate, days: u32) -> impl Iterator<Item = NaiveDate> {
    (0..days).filter_map(move |offset| start.checked_add_days(Days::new(u64::from(offset))))
}
