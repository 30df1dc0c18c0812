/// Forecast reconciliation and battery prognosis.
///
/// Everything in here is pure computation over small in-memory series:
/// no I/O, no shared state. Reading raw rows and writing results belong to
/// `ingest` and `storage`.
///
/// Submodules:
/// - `merge`      : folds repeated fetches into one series per granularity.
/// - `horizon`    : lays the daily series onto the planning calendar.
/// - `yield_calc` : irradiance to generated energy for the installation.
/// - `battery`    : the day-by-day state-of-charge simulator.
/// - `sensitivity`: independent runs over alternative configurations.

pub mod battery;
pub mod horizon;
pub mod merge;
pub mod sensitivity;
pub mod yield_calc;
