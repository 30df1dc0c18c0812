//! Deduplicating merge of repeated forecast fetches.
//!
//! The same forecast slot is fetched again every run, and each fetch refines
//! the estimate as the target date approaches. Merging therefore keeps one
//! record per key and lets the most recently fetched record win; values are
//! never averaged.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::model::{ObservationKey, ObservationRecord, ObservationSeries, PrognosisError};

/// Counts describing what a merge did with each incoming key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Keys that were not present in the existing series.
    pub inserted: usize,
    /// Keys whose stored record was replaced by a different, fresher one.
    pub replaced: usize,
    /// Keys where the incoming record was identical to the stored one.
    pub unchanged: usize,
    /// Keys where the stored record was fetched later than the incoming one.
    pub kept_existing: usize,
}

/// Merges a batch of normalized records into `existing`, returning a new
/// series and a report. `existing` is left untouched.
///
/// Within the batch, two records for the same key must come from the same
/// source; otherwise the batch is ambiguous and rejected with
/// `InvalidMerge`. Same-source duplicates resolve to the later
/// `fetched_at` (the later position on a tie).
///
/// Against the existing series, the record with the higher precedence
/// wins: later `fetched_at` first, then the larger irradiance, then the
/// source name. Precedence is a total order over differing records, so the
/// result is independent of the order in which fetches are merged, even
/// when two fetches carry the same timestamp.
///
/// A stored record that matches the incoming one up to float round-off
/// (for instance after a trip through the kWh history file) counts as
/// unchanged and is kept as stored.
pub fn merge(
    existing: &ObservationSeries,
    incoming: &[ObservationRecord],
) -> Result<(ObservationSeries, MergeReport), PrognosisError> {
    let granularity = existing.granularity();
    let batch = resolve_batch(existing, incoming)?;

    let mut merged: BTreeMap<ObservationKey, ObservationRecord> =
        existing.iter().map(|r| (r.key(), r.clone())).collect();
    let mut report = MergeReport::default();

    for (key, record) in batch {
        match merged.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                report.inserted += 1;
            }
            Entry::Occupied(mut slot) => {
                let stored = slot.get();
                if same_observation(stored, record) {
                    report.unchanged += 1;
                } else if precedence(record, stored) == Ordering::Greater {
                    slot.insert(record.clone());
                    report.replaced += 1;
                } else {
                    report.kept_existing += 1;
                }
            }
        }
    }

    let series = ObservationSeries::from_sorted(granularity, merged.into_values().collect())?;

    tracing::debug!(
        stage = %crate::logging::Stage::Merge,
        granularity = %granularity,
        inserted = report.inserted,
        replaced = report.replaced,
        unchanged = report.unchanged,
        kept_existing = report.kept_existing,
        "merged batch"
    );

    Ok((series, report))
}

/// Relative tolerance for treating two irradiance values as the same reading.
const VALUE_TOLERANCE: f64 = 1e-9;

fn same_observation(a: &ObservationRecord, b: &ObservationRecord) -> bool {
    let scale = a.irradiance_wh_m2.abs().max(b.irradiance_wh_m2.abs()).max(1.0);
    a.key() == b.key()
        && a.fetched_at == b.fetched_at
        && a.source == b.source
        && (a.irradiance_wh_m2 - b.irradiance_wh_m2).abs() <= VALUE_TOLERANCE * scale
}

fn precedence(a: &ObservationRecord, b: &ObservationRecord) -> Ordering {
    a.fetched_at
        .cmp(&b.fetched_at)
        .then_with(|| a.irradiance_wh_m2.total_cmp(&b.irradiance_wh_m2))
        .then_with(|| a.source.cmp(&b.source))
}

/// Collapses the incoming batch to one record per key.
fn resolve_batch<'a>(
    existing: &ObservationSeries,
    incoming: &'a [ObservationRecord],
) -> Result<BTreeMap<ObservationKey, &'a ObservationRecord>, PrognosisError> {
    let mut batch: BTreeMap<ObservationKey, &ObservationRecord> = BTreeMap::new();

    for record in incoming {
        if record.granularity() != existing.granularity() {
            return Err(PrognosisError::InvalidMerge(format!(
                "{} record {} cannot be merged into a {} series",
                record.granularity(),
                record.key(),
                existing.granularity()
            )));
        }

        match batch.entry(record.key()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                let seen = *slot.get();
                if seen.source != record.source {
                    return Err(PrognosisError::InvalidMerge(format!(
                        "key {} appears twice in one batch with sources '{}' and '{}'",
                        record.key(),
                        seen.source,
                        record.source
                    )));
                }
                if record.fetched_at >= seen.fetched_at {
                    slot.insert(record);
                }
            }
        }
    }

    Ok(batch)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
