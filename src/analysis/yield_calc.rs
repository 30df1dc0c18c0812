//! Panel yield calculation.
//!
//! Energy produced by the installation for a day's irradiance:
//!
//!   generated_kwh = irradiance_kwh_m2 × area_per_panel_m2 × panel_count
//!                   × panel_efficiency × system_efficiency
//!
//! `system_efficiency` covers inverter and wiring losses.

use crate::model::PrognosisError;

/// Physical description of the panel installation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelConfig {
    pub area_per_panel_m2: f64,
    pub panel_count: u32,
    /// Fraction in (0, 1].
    pub panel_efficiency: f64,
    /// Fraction in (0, 1].
    pub system_efficiency: f64,
}

impl PanelConfig {
    /// Rejects non-physical parameters with `InvalidConfiguration`.
    pub fn validate(&self) -> Result<(), PrognosisError> {
        if !(self.area_per_panel_m2.is_finite() && self.area_per_panel_m2 > 0.0) {
            return Err(PrognosisError::InvalidConfiguration(format!(
                "area_per_panel_m2 must be positive, got {}",
                self.area_per_panel_m2
            )));
        }
        if self.panel_count == 0 {
            return Err(PrognosisError::InvalidConfiguration(
                "panel_count must be at least 1".to_string(),
            ));
        }
        check_fraction("panel_efficiency", self.panel_efficiency)?;
        check_fraction("system_efficiency", self.system_efficiency)?;
        Ok(())
    }

    pub fn total_area_m2(&self) -> f64 {
        self.area_per_panel_m2 * f64::from(self.panel_count)
    }

    /// kWh produced by one panel per kWh/m² of irradiance.
    fn per_panel_factor(&self) -> f64 {
        self.area_per_panel_m2 * self.panel_efficiency * self.system_efficiency
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), PrognosisError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(PrognosisError::InvalidConfiguration(format!(
            "{} must be in (0, 1], got {}",
            name, value
        )))
    }
}

/// Yield for one panel.
pub fn per_panel_yield_kwh(
    irradiance_kwh_m2: f64,
    panels: &PanelConfig,
) -> Result<f64, PrognosisError> {
    panels.validate()?;
    Ok(irradiance_kwh_m2 * panels.per_panel_factor())
}

/// Yield for the whole installation.
pub fn generated_energy_kwh(
    irradiance_kwh_m2: f64,
    panels: &PanelConfig,
) -> Result<f64, PrognosisError> {
    Ok(per_panel_yield_kwh(irradiance_kwh_m2, panels)? * f64::from(panels.panel_count))
}
