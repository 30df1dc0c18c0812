/// Ingestion of raw forecast rows.
///
/// Fetching the source page and parsing its tables happen outside this
/// crate; what arrives here is a batch of raw rows per granularity.
///
/// Submodules:
/// - `normalize`: turns raw rows into canonical Wh/m² observations.

pub mod normalize;
