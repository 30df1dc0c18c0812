//! Day-by-day battery state-of-charge simulation.
//!
//! The simulator walks the forecast horizon in date order. Its only state is
//! the energy stored at the end of the previous day; each day's transition
//! is a pure function of that scalar, the day's generation, and the battery
//! parameters.
//!
//! Per day:
//!   1. headroom   = capacity - stored
//!   2. max_charge = min(headroom, rate × window, generated)
//!   3. surplus    = generated - load
//!        surplus ≥ 0 → charge    = min(max_charge, surplus)
//!        surplus < 0 → discharge = min(-surplus, stored)
//!   4. stored    += charge - discharge, clamped to [0, capacity]
//!   5. status from the end-of-day energy and that day's flows
//!
//! Status precedence: Full and Empty override Charging and Discharging,
//! which override Idle.

use chrono::{Days, NaiveDate};
use serde::Deserialize;

use crate::analysis::horizon::ForecastDay;
use crate::analysis::yield_calc::{self, PanelConfig};
use crate::logging::Stage;
use crate::model::{
    BatteryDayState, BatteryStatus, ChargeLimit, PrognosisError, ENERGY_EPSILON_KWH,
};

/// Default number of hours per day charging at the rated power is possible.
pub const DEFAULT_CHARGE_WINDOW_HOURS: f64 = 8.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Aggregate battery bank parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryConfig {
    pub capacity_kwh: f64,
    pub max_charge_rate_kw: f64,
    pub charge_window_hours: f64,
    /// Energy drawn from the battery each day; 0 when demand is not modeled.
    pub daily_load_kwh: f64,
    /// Starting state of charge. Always explicit: there is no default.
    pub initial_soc_percent: f64,
}

impl BatteryConfig {
    /// Rejects non-physical parameters with `InvalidConfiguration`.
    pub fn validate(&self) -> Result<(), PrognosisError> {
        if !(self.capacity_kwh.is_finite() && self.capacity_kwh > 0.0) {
            return Err(PrognosisError::InvalidConfiguration(format!(
                "capacity_kwh must be positive, got {}",
                self.capacity_kwh
            )));
        }
        if !(self.max_charge_rate_kw.is_finite() && self.max_charge_rate_kw > 0.0) {
            return Err(PrognosisError::InvalidConfiguration(format!(
                "max_charge_rate_kw must be positive, got {}",
                self.max_charge_rate_kw
            )));
        }
        if !(self.charge_window_hours > 0.0 && self.charge_window_hours <= 24.0) {
            return Err(PrognosisError::InvalidConfiguration(format!(
                "charge_window_hours must be in (0, 24], got {}",
                self.charge_window_hours
            )));
        }
        if !(self.daily_load_kwh.is_finite() && self.daily_load_kwh >= 0.0) {
            return Err(PrognosisError::InvalidConfiguration(format!(
                "daily_load_kwh must be non-negative, got {}",
                self.daily_load_kwh
            )));
        }
        if !(0.0..=100.0).contains(&self.initial_soc_percent) {
            return Err(PrognosisError::InvalidConfiguration(format!(
                "initial_soc_percent must be in [0, 100], got {}",
                self.initial_soc_percent
            )));
        }
        Ok(())
    }

    pub fn initial_energy_kwh(&self) -> f64 {
        self.initial_soc_percent / 100.0 * self.capacity_kwh
    }

    /// Most energy the charger can move in one day.
    pub fn rate_limit_kwh(&self) -> f64 {
        self.max_charge_rate_kw * self.charge_window_hours
    }
}

/// What to do with a horizon day that has no forecast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Simulate the day with no generation; the load is still served.
    #[default]
    ZeroGeneration,
    /// Leave the day out of the trajectory; stored energy carries over.
    Skip,
}

// ---------------------------------------------------------------------------
// Single-day transition
// ---------------------------------------------------------------------------

/// The result of applying one day to the battery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayTransition {
    pub charge_energy_kwh: f64,
    pub discharge_energy_kwh: f64,
    /// Stored energy at the end of the day.
    pub battery_energy_kwh: f64,
    pub status: BatteryStatus,
    pub charge_limit: ChargeLimit,
    pub clamped: bool,
}

/// Applies one day's generation to a battery holding `battery_energy_kwh`.
///
/// `battery` is assumed valid; [`BatterySimulator::new`] checks it once
/// before any day is processed.
pub fn transition(
    battery: &BatteryConfig,
    battery_energy_kwh: f64,
    generated_energy_kwh: f64,
) -> DayTransition {
    let capacity = battery.capacity_kwh;
    let headroom = (capacity - battery_energy_kwh).max(0.0);
    let (max_charge, charge_limit) =
        max_chargeable(headroom, battery.rate_limit_kwh(), generated_energy_kwh);

    let surplus = generated_energy_kwh - battery.daily_load_kwh;
    let (charge, discharge) = if surplus >= 0.0 {
        (max_charge.min(surplus), 0.0)
    } else {
        (0.0, (-surplus).min(battery_energy_kwh).max(0.0))
    };

    let unclamped = battery_energy_kwh + charge - discharge;
    let ending = unclamped.clamp(0.0, capacity);
    let clamped = (unclamped - ending).abs() > ENERGY_EPSILON_KWH;

    DayTransition {
        charge_energy_kwh: charge,
        discharge_energy_kwh: discharge,
        battery_energy_kwh: ending,
        status: classify(ending, capacity, charge, discharge),
        charge_limit,
        clamped,
    }
}

/// Smallest of the three charging bounds, with the bound that set it.
/// Ties go to capacity, then to charge rate.
fn max_chargeable(headroom: f64, rate_limit: f64, generated: f64) -> (f64, ChargeLimit) {
    if headroom <= rate_limit && headroom <= generated {
        (headroom, ChargeLimit::Capacity)
    } else if rate_limit <= generated {
        (rate_limit, ChargeLimit::ChargeRate)
    } else {
        (generated.max(0.0), ChargeLimit::Generation)
    }
}

/// Classifies the end-of-day battery state.
pub fn classify(
    battery_energy_kwh: f64,
    capacity_kwh: f64,
    charge_energy_kwh: f64,
    discharge_energy_kwh: f64,
) -> BatteryStatus {
    if battery_energy_kwh >= capacity_kwh - ENERGY_EPSILON_KWH {
        BatteryStatus::Full
    } else if battery_energy_kwh <= ENERGY_EPSILON_KWH {
        BatteryStatus::Empty
    } else if charge_energy_kwh > 0.0 {
        BatteryStatus::Charging
    } else if discharge_energy_kwh > 0.0 {
        BatteryStatus::Discharging
    } else {
        BatteryStatus::Idle
    }
}

/// "Today", "Tomorrow", or the English weekday name of `date`.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.checked_add_days(Days::new(1)) == Some(date) {
        "Tomorrow".to_string()
    } else {
        date.format("%A").to_string()
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// A validated panel + battery setup ready to run over forecast horizons.
///
/// The simulator holds no per-run state, so one instance can run any number
/// of horizons, including concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct BatterySimulator {
    panels: PanelConfig,
    battery: BatteryConfig,
    gap_policy: GapPolicy,
}

impl BatterySimulator {
    /// Validates both configurations up front so a run never produces
    /// partial output.
    pub fn new(
        panels: PanelConfig,
        battery: BatteryConfig,
        gap_policy: GapPolicy,
    ) -> Result<Self, PrognosisError> {
        panels.validate()?;
        battery.validate()?;
        Ok(Self {
            panels,
            battery,
            gap_policy,
        })
    }

    pub fn panels(&self) -> &PanelConfig {
        &self.panels
    }

    pub fn battery(&self) -> &BatteryConfig {
        &self.battery
    }

    pub fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }

    /// Runs the horizon and returns one state per simulated day.
    ///
    /// `today` only affects day labels. The horizon must be strictly
    /// increasing by date.
    pub fn simulate(
        &self,
        horizon: &[ForecastDay],
        today: NaiveDate,
    ) -> Result<Vec<BatteryDayState>, PrognosisError> {
        if let Some(pair) = horizon.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(PrognosisError::InvalidConfiguration(format!(
                "horizon dates must be strictly increasing: {} then {}",
                pair[0].date, pair[1].date
            )));
        }

        let mut states = Vec::with_capacity(horizon.len());
        let mut battery_energy_kwh = self.battery.initial_energy_kwh();

        for day in horizon {
            let (irradiance, forecast_missing) = match (day.irradiance_kwh_m2, self.gap_policy) {
                (Some(value), _) => (value, false),
                (None, GapPolicy::ZeroGeneration) => (0.0, true),
                (None, GapPolicy::Skip) => {
                    tracing::debug!(stage = %Stage::Battery, date = %day.date, "no forecast, skipping day");
                    continue;
                }
            };

            let state = self.simulate_day(day.date, today, irradiance, forecast_missing, battery_energy_kwh)?;
            battery_energy_kwh = state.battery_energy_kwh;
            states.push(state);
        }

        Ok(states)
    }

    fn simulate_day(
        &self,
        date: NaiveDate,
        today: NaiveDate,
        irradiance_kwh_m2: f64,
        forecast_missing: bool,
        battery_energy_kwh: f64,
    ) -> Result<BatteryDayState, PrognosisError> {
        let generated = yield_calc::generated_energy_kwh(irradiance_kwh_m2, &self.panels)?;
        let step = transition(&self.battery, battery_energy_kwh, generated);

        if step.clamped {
            tracing::warn!(
                stage = %Stage::Battery,
                %date,
                start_kwh = battery_energy_kwh,
                charge_kwh = step.charge_energy_kwh,
                discharge_kwh = step.discharge_energy_kwh,
                "battery energy left [0, capacity] and was clamped; check the battery configuration"
            );
        }

        Ok(BatteryDayState {
            date,
            day_label: day_label(date, today),
            solar_radiation_kwh_m2: irradiance_kwh_m2,
            generated_energy_kwh: generated,
            charge_energy_kwh: step.charge_energy_kwh,
            discharge_energy_kwh: step.discharge_energy_kwh,
            soc_percent: step.battery_energy_kwh / self.battery.capacity_kwh * 100.0,
            battery_energy_kwh: step.battery_energy_kwh,
            status: step.status,
            charge_limit: step.charge_limit,
            forecast_missing,
            clamped: step.clamped,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
