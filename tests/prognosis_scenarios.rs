/// Integration tests for the battery prognosis
///
/// Tests verify:
/// 1. The reference installation scenarios (empty, full, shortfall)
/// 2. Energy conservation and bounds over a mixed multi-day horizon
/// 3. Gap handling for days without a forecast
/// 4. Configuration file → simulator → prognosis table
///
/// Run with: cargo test --test prognosis_scenarios

use approx::assert_relative_eq;
use chrono::{Days, NaiveDate};

use solar_prognosis::analysis::battery::{BatteryConfig, BatterySimulator, GapPolicy};
use solar_prognosis::analysis::horizon::ForecastDay;
use solar_prognosis::analysis::sensitivity::{capacity_sweep, simulate_scenarios};
use solar_prognosis::analysis::yield_calc::PanelConfig;
use solar_prognosis::config::Config;
use solar_prognosis::model::{BatteryStatus, ChargeLimit, PrognosisError, ENERGY_EPSILON_KWH};
use solar_prognosis::storage;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

fn reference_panels() -> PanelConfig {
    PanelConfig {
        area_per_panel_m2: 1.8,
        panel_count: 8,
        panel_efficiency: 0.20,
        system_efficiency: 0.85,
    }
}

fn battery(initial_soc_percent: f64, daily_load_kwh: f64) -> BatteryConfig {
    BatteryConfig {
        capacity_kwh: 10.0,
        max_charge_rate_kw: 5.0,
        charge_window_hours: 8.0,
        daily_load_kwh,
        initial_soc_percent,
    }
}

fn horizon(values: &[Option<f64>]) -> Vec<ForecastDay> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let date = today().checked_add_days(Days::new(i as u64)).unwrap();
            ForecastDay {
                date,
                irradiance_kwh_m2: *v,
            }
        })
        .collect()
}

/// Irradiance (kWh/m²) that makes the reference panels generate `kwh`.
fn irradiance_for(kwh: f64) -> f64 {
    kwh / (1.8 * 8.0 * 0.20 * 0.85)
}

// ---------------------------------------------------------------------------
// Reference scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_empty_battery_charges_by_generation() {
    let sim = BatterySimulator::new(reference_panels(), battery(0.0, 0.0), GapPolicy::default()).unwrap();
    let states = sim.simulate(&horizon(&[Some(1.10)]), today()).unwrap();

    let day = &states[0];
    assert_relative_eq!(day.generated_energy_kwh, 2.6928, epsilon = 1e-9);
    assert_relative_eq!(day.charge_energy_kwh, 2.6928, epsilon = 1e-9);
    assert_relative_eq!(day.soc_percent, 26.928, epsilon = 1e-6);
    assert_eq!(day.status, BatteryStatus::Charging);
    assert_eq!(day.charge_limit, ChargeLimit::Generation);
    assert_eq!(day.day_label, "Today");
}

#[test]
fn test_full_battery_stays_full() {
    let sim = BatterySimulator::new(reference_panels(), battery(100.0, 0.0), GapPolicy::default()).unwrap();
    let states = sim.simulate(&horizon(&[Some(1.10)]), today()).unwrap();

    assert_eq!(states[0].charge_energy_kwh, 0.0);
    assert_eq!(states[0].discharge_energy_kwh, 0.0);
    assert_eq!(states[0].status, BatteryStatus::Full);
    assert_eq!(states[0].charge_limit, ChargeLimit::Capacity);
}

#[test]
fn test_shortfall_discharges_the_battery() {
    let sim = BatterySimulator::new(reference_panels(), battery(50.0, 3.0), GapPolicy::default()).unwrap();
    let states = sim.simulate(&horizon(&[Some(irradiance_for(1.0))]), today()).unwrap();

    assert_relative_eq!(states[0].generated_energy_kwh, 1.0, epsilon = 1e-9);
    assert_relative_eq!(states[0].discharge_energy_kwh, 2.0, epsilon = 1e-9);
    assert_relative_eq!(states[0].battery_energy_kwh, 3.0, epsilon = 1e-9);
    assert_eq!(states[0].charge_energy_kwh, 0.0);
    assert_eq!(states[0].status, BatteryStatus::Discharging);
}

// ---------------------------------------------------------------------------
// Properties over a longer horizon
// ---------------------------------------------------------------------------

#[test]
fn test_energy_is_conserved_and_bounded_every_day() {
    let values = [
        Some(4.5),
        Some(0.2),
        None,
        Some(6.0),
        Some(6.0),
        Some(0.0),
        Some(1.1),
        None,
        Some(3.3),
        Some(0.05),
    ];
    for (soc, load) in [(0.0, 0.0), (35.0, 2.5), (100.0, 6.0), (10.0, 12.0)] {
        let cfg = battery(soc, load);
        let sim = BatterySimulator::new(reference_panels(), cfg, GapPolicy::ZeroGeneration).unwrap();
        let states = sim.simulate(&horizon(&values), today()).unwrap();
        assert_eq!(states.len(), values.len());

        let mut previous = cfg.initial_energy_kwh();
        for state in &states {
            assert_relative_eq!(
                state.battery_energy_kwh,
                previous + state.charge_energy_kwh - state.discharge_energy_kwh,
                epsilon = ENERGY_EPSILON_KWH
            );
            assert!((0.0..=100.0).contains(&state.soc_percent), "soc {} out of range", state.soc_percent);
            assert!(state.charge_energy_kwh >= 0.0);
            assert!(state.discharge_energy_kwh >= 0.0);
            assert!(
                state.charge_energy_kwh == 0.0 || state.discharge_energy_kwh == 0.0,
                "charged and discharged on {}",
                state.date
            );
            assert!(state.charge_energy_kwh <= cfg.rate_limit_kwh() + ENERGY_EPSILON_KWH);
            assert!(!state.clamped);
            previous = state.battery_energy_kwh;
        }
    }
}

#[test]
fn test_gap_policies_differ_only_on_missing_days() {
    let values = [Some(1.1), None, Some(1.1)];

    let zero = BatterySimulator::new(reference_panels(), battery(0.0, 0.0), GapPolicy::ZeroGeneration)
        .unwrap()
        .simulate(&horizon(&values), today())
        .unwrap();
    let skip = BatterySimulator::new(reference_panels(), battery(0.0, 0.0), GapPolicy::Skip)
        .unwrap()
        .simulate(&horizon(&values), today())
        .unwrap();

    assert_eq!(zero.len(), 3);
    assert!(zero[1].forecast_missing);
    assert_eq!(zero[1].day_label, "Tomorrow");
    assert_eq!(skip.len(), 2);
    assert!(skip.iter().all(|s| !s.forecast_missing));
    assert_relative_eq!(zero[2].battery_energy_kwh, skip[1].battery_energy_kwh, epsilon = 1e-12);
}

#[test]
fn test_out_of_order_horizon_is_rejected() {
    let mut days = horizon(&[Some(1.0), Some(1.0)]);
    days.swap(0, 1);
    let sim = BatterySimulator::new(reference_panels(), battery(0.0, 0.0), GapPolicy::default()).unwrap();
    assert!(matches!(
        sim.simulate(&days, today()),
        Err(PrognosisError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_bigger_battery_never_ends_lower() {
    let days = horizon(&[Some(6.0); 6]);
    let scenarios = capacity_sweep(reference_panels(), battery(0.0, 1.0), GapPolicy::default(), &[5.0, 10.0, 20.0, 40.0]);
    let results = simulate_scenarios(&scenarios, &days, today());

    let finals: Vec<f64> = results.iter().map(|r| r.final_energy_kwh().unwrap()).collect();
    assert!(finals.windows(2).all(|w| w[0] <= w[1] + 1e-9), "{:?}", finals);
}

// ---------------------------------------------------------------------------
// Configuration to prognosis table
// ---------------------------------------------------------------------------

#[test]
fn test_config_file_drives_the_prognosis_table() {
    let config = Config::from_toml_str(
        r#"
        [solar_panel]
        count = 8
        area_per_panel_m2 = 1.8
        efficiency = 20

        [system]
        efficiency = 85

        [battery]
        count = 2
        capacity_kwh_per_battery = 5
        max_charge_rate_kw_per_battery = 2.5
        initial_soc_percent = 0
        "#,
    )
    .unwrap();

    let states = config
        .simulator()
        .unwrap()
        .simulate(&horizon(&[Some(1.10), Some(1.10)]), today())
        .unwrap();

    let mut out = Vec::new();
    storage::write_prognosis(&mut out, &states).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "Date,DayName,SolarRadiation_kWh_m2,ChargeEnergy_kWh,DischargeEnergy_kWh,BatterySOC_percent,BatteryEnergy_kWh,Status"
    );
    assert_eq!(lines[1], "2025-06-02,Today,1.1,2.693,0.0,26.93,2.693,Charging");
    assert_eq!(lines[2], "2025-06-03,Tomorrow,1.1,2.693,0.0,53.86,5.386,Charging");
}
