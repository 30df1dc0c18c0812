//! Parallel what-if runs over alternative installations.
//!
//! Each scenario gets its own simulator and its own stored-energy
//! accumulator, so runs share nothing but the read-only horizon.

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::analysis::battery::{BatteryConfig, BatterySimulator, GapPolicy};
use crate::analysis::horizon::ForecastDay;
use crate::analysis::yield_calc::PanelConfig;
use crate::model::{BatteryDayState, PrognosisError};

/// One named configuration to simulate.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub panels: PanelConfig,
    pub battery: BatteryConfig,
    pub gap_policy: GapPolicy,
}

/// Outcome of one scenario. An invalid configuration fails only its own run.
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub states: Result<Vec<BatteryDayState>, PrognosisError>,
}

impl ScenarioResult {
    /// Stored energy after the last simulated day.
    pub fn final_energy_kwh(&self) -> Option<f64> {
        self.states
            .as_ref()
            .ok()
            .and_then(|s| s.last())
            .map(|s| s.battery_energy_kwh)
    }
}

/// Simulates every scenario over the same horizon in parallel.
///
/// Results come back in the order of `scenarios`.
pub fn simulate_scenarios(
    scenarios: &[Scenario],
    horizon: &[ForecastDay],
    today: NaiveDate,
) -> Vec<ScenarioResult> {
    scenarios
        .par_iter()
        .map(|scenario| ScenarioResult {
            name: scenario.name.clone(),
            states: BatterySimulator::new(scenario.panels, scenario.battery, scenario.gap_policy)
                .and_then(|sim| sim.simulate(horizon, today)),
        })
        .collect()
}

/// Builds one scenario per battery capacity, keeping everything else fixed.
pub fn capacity_sweep(
    panels: PanelConfig,
    battery: BatteryConfig,
    gap_policy: GapPolicy,
    capacities_kwh: &[f64],
) -> Vec<Scenario> {
    capacities_kwh
        .iter()
        .map(|&capacity_kwh| Scenario {
            name: format!("{:.1} kWh", capacity_kwh),
            panels,
            battery: BatteryConfig {
                capacity_kwh,
                ..battery
            },
            gap_policy,
        })
        .collect()
}
