//! Solar forecast reconciliation and battery state-of-charge prognosis.
//!
//! Repeated irradiance forecast fetches are normalized to Wh/m², merged into
//! a deduplicated history where the freshest fetch wins, converted to panel
//! yield, and run through a day-by-day battery model.

pub mod analysis;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod storage;
