//! Configuration loading for the solar prognosis service.
//!
//! All user-facing knobs live in one TOML file so the installation can be
//! described by changing numbers rather than code. Sections map onto the
//! physical model: `[solar_panel]` and `[system]` feed the yield
//! calculator, `[battery]` the simulator. Battery capacity and charge rate
//! are given per battery and multiplied by the battery count.
//!
//! `battery.initial_soc_percent` has no default: the starting charge must
//! always be stated explicitly.

use serde::Deserialize;
use std::path::Path;

use crate::analysis::battery::{BatteryConfig, BatterySimulator, GapPolicy, DEFAULT_CHARGE_WINDOW_HOURS};
use crate::analysis::yield_calc::PanelConfig;
use crate::logging::{LogLevel, Stage};
use crate::model::PrognosisError;

fn default_source_name() -> String { "tutiempo.net".to_string() }
fn default_location() -> String { "Deinze".to_string() }
fn default_panel_count() -> u32 { 8 }
fn default_area_per_panel() -> f64 { 1.8 }
fn default_panel_efficiency() -> f64 { 0.20 }
fn default_system_efficiency() -> f64 { 0.85 }
fn default_battery_count() -> u32 { 1 }
fn default_capacity_per_battery() -> f64 { 10.0 }
fn default_charge_rate_per_battery() -> f64 { 5.0 }
fn default_charge_window() -> f64 { DEFAULT_CHARGE_WINDOW_HOURS }
fn default_horizon_days() -> u32 { 15 }

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub solar_panel: SolarPanelSection,
    #[serde(default)]
    pub system: SystemSection,
    pub battery: BatterySection,
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Provider name stamped on every normalized record.
    #[serde(default = "default_source_name")]
    pub name: String,
    #[serde(default = "default_location")]
    pub location: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: default_source_name(),
            location: default_location(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolarPanelSection {
    #[serde(default = "default_panel_count")]
    pub count: u32,
    #[serde(default = "default_area_per_panel")]
    pub area_per_panel_m2: f64,
    /// Datasheet efficiency, as a fraction (0.20) or a percentage (20).
    #[serde(default = "default_panel_efficiency")]
    pub efficiency: f64,
}

impl Default for SolarPanelSection {
    fn default() -> Self {
        Self {
            count: default_panel_count(),
            area_per_panel_m2: default_area_per_panel(),
            efficiency: default_panel_efficiency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSection {
    /// Inverter and wiring losses, as a fraction or a percentage.
    #[serde(default = "default_system_efficiency")]
    pub efficiency: f64,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            efficiency: default_system_efficiency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatterySection {
    #[serde(default = "default_battery_count")]
    pub count: u32,
    #[serde(default = "default_capacity_per_battery")]
    pub capacity_kwh_per_battery: f64,
    #[serde(default = "default_charge_rate_per_battery")]
    pub max_charge_rate_kw_per_battery: f64,
    #[serde(default = "default_charge_window")]
    pub charge_window_hours: f64,
    #[serde(default)]
    pub daily_load_kwh: f64,
    pub initial_soc_percent: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default)]
    pub gap_policy: GapPolicy,
    /// Fill days without a daily total from the hourly detail.
    #[serde(default)]
    pub hourly_fallback: bool,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            gap_policy: GapPolicy::default(),
            hourly_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: LogLevel,
    /// Append log output to this file in addition to the console.
    pub file: Option<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PrognosisError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(stage = %Stage::Config, path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PrognosisError> {
        Ok(toml::from_str(content)?)
    }

    /// The validated panel model.
    pub fn panel_config(&self) -> Result<PanelConfig, PrognosisError> {
        let panels = PanelConfig {
            area_per_panel_m2: self.solar_panel.area_per_panel_m2,
            panel_count: self.solar_panel.count,
            panel_efficiency: as_fraction("solar_panel.efficiency", self.solar_panel.efficiency),
            system_efficiency: as_fraction("system.efficiency", self.system.efficiency),
        };
        panels.validate()?;
        Ok(panels)
    }

    /// The validated battery bank, aggregated over all batteries.
    pub fn battery_config(&self) -> Result<BatteryConfig, PrognosisError> {
        let section = &self.battery;
        if section.count == 0 {
            return Err(PrognosisError::InvalidConfiguration(
                "battery.count must be at least 1".to_string(),
            ));
        }
        let count = f64::from(section.count);
        let battery = BatteryConfig {
            capacity_kwh: section.capacity_kwh_per_battery * count,
            max_charge_rate_kw: section.max_charge_rate_kw_per_battery * count,
            charge_window_hours: section.charge_window_hours,
            daily_load_kwh: section.daily_load_kwh,
            initial_soc_percent: section.initial_soc_percent,
        };
        battery.validate()?;
        Ok(battery)
    }

    pub fn simulator(&self) -> Result<BatterySimulator, PrognosisError> {
        BatterySimulator::new(
            self.panel_config()?,
            self.battery_config()?,
            self.simulation.gap_policy,
        )
    }
}

/// Accepts percentages written as whole numbers (20 → 0.20).
fn as_fraction(name: &str, value: f64) -> f64 {
    if value > 1.0 && value <= 100.0 {
        tracing::debug!(stage = %Stage::Config, name, value, "treating efficiency as a percentage");
        value / 100.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FULL: &str = r#"
        [source]
        name = "tutiempo.net"
        location = "Deinze"

        [solar_panel]
        count = 8
        area_per_panel_m2 = 1.8
        efficiency = 0.20

        [system]
        efficiency = 0.85

        [battery]
        count = 2
        capacity_kwh_per_battery = 5.0
        max_charge_rate_kw_per_battery = 2.5
        charge_window_hours = 6
        daily_load_kwh = 1.5
        initial_soc_percent = 40

        [simulation]
        horizon_days = 7
        gap_policy = "skip"
        hourly_fallback = true

        [logging]
        level = "debug"
        file = "solar_prognosis.log"
    "#;

    #[test]
    fn test_full_config_parses() {
        let config = Config::from_toml_str(FULL).expect("full config should parse");
        assert_eq!(config.source.location, "Deinze");
        assert_eq!(config.simulation.horizon_days, 7);
        assert_eq!(config.simulation.gap_policy, GapPolicy::Skip);
        assert!(config.simulation.hourly_fallback);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.file.as_deref(), Some("solar_prognosis.log"));
    }

    #[test]
    fn test_battery_values_are_multiplied_by_count() {
        let battery = Config::from_toml_str(FULL).unwrap().battery_config().unwrap();
        assert_relative_eq!(battery.capacity_kwh, 10.0);
        assert_relative_eq!(battery.max_charge_rate_kw, 5.0);
        assert_relative_eq!(battery.charge_window_hours, 6.0);
        assert_relative_eq!(battery.initial_energy_kwh(), 4.0);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str("[battery]\ninitial_soc_percent = 0\n").unwrap();
        let panels = config.panel_config().unwrap();
        let battery = config.battery_config().unwrap();

        assert_eq!(panels.panel_count, 8);
        assert_relative_eq!(panels.area_per_panel_m2, 1.8);
        assert_relative_eq!(battery.capacity_kwh, 10.0);
        assert_relative_eq!(battery.max_charge_rate_kw, 5.0);
        assert_relative_eq!(battery.charge_window_hours, 8.0);
        assert_eq!(battery.daily_load_kwh, 0.0);
        assert_eq!(config.simulation.horizon_days, 15);
        assert_eq!(config.simulation.gap_policy, GapPolicy::ZeroGeneration);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_initial_soc_is_required() {
        let result = Config::from_toml_str("[battery]\ncount = 1\n");
        assert!(matches!(result, Err(PrognosisError::ConfigParse(_))));
    }

    #[test]
    fn test_percentage_efficiencies_are_coerced() {
        let config = Config::from_toml_str(
            "[solar_panel]\nefficiency = 21.5\n[system]\nefficiency = 90\n[battery]\ninitial_soc_percent = 0\n",
        )
        .unwrap();
        let panels = config.panel_config().unwrap();
        assert_relative_eq!(panels.panel_efficiency, 0.215, epsilon = 1e-12);
        assert_relative_eq!(panels.system_efficiency, 0.90, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_range_values_are_invalid_configuration() {
        let bad_efficiency = Config::from_toml_str(
            "[solar_panel]\nefficiency = 150\n[battery]\ninitial_soc_percent = 0\n",
        )
        .unwrap();
        assert!(matches!(
            bad_efficiency.panel_config(),
            Err(PrognosisError::InvalidConfiguration(_))
        ));

        let no_batteries =
            Config::from_toml_str("[battery]\ncount = 0\ninitial_soc_percent = 0\n").unwrap();
        assert!(matches!(
            no_batteries.battery_config(),
            Err(PrognosisError::InvalidConfiguration(_))
        ));

        let negative_capacity = Config::from_toml_str(
            "[battery]\ncapacity_kwh_per_battery = -5\ninitial_soc_percent = 0\n",
        )
        .unwrap();
        assert!(negative_capacity.simulator().is_err());
    }

    #[test]
    fn test_unknown_gap_policy_fails_to_parse() {
        let result = Config::from_toml_str(
            "[battery]\ninitial_soc_percent = 0\n[simulation]\ngap_policy = \"interpolate\"\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = Config::load("does/not/exist/prognosis.toml");
        assert!(matches!(result, Err(PrognosisError::Io(_))));
    }
}
