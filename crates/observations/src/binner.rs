//! Grouping of observation records into per-timestamp buckets.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::record::{ObservationRecord, Quantity};
use crate::time::TimestampKey;
use crate::variable::Variable;

/// One retained, unit-converted station value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationValue {
    pub station_id: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

/// Station values keyed by timestamp. Each bucket keeps input order.
pub type TimestampBuckets = BTreeMap<TimestampKey, Vec<StationValue>>;

/// Group `records` by timestamp, keeping only usable values of `quantity`.
///
/// A record is dropped, without error, when its latitude, longitude or the
/// selected quantity is masked, or when `is_valid` rejects the raw value.
/// `convert` is applied to retained values only. Every timestamp seen gets
/// a bucket, even if all of its records were dropped.
pub fn bin<C, P>(
    records: &[ObservationRecord],
    quantity: Quantity,
    convert: C,
    is_valid: P,
) -> TimestampBuckets
where
    C: Fn(f64) -> f64,
    P: Fn(f64) -> bool,
{
    let mut buckets = TimestampBuckets::new();
    let mut dropped = 0usize;

    for record in records {
        let bucket = buckets.entry(record.timestamp_key()).or_default();

        let (Some(latitude), Some(longitude)) = (record.latitude, record.longitude) else {
            dropped += 1;
            continue;
        };
        let Some(raw) = record.quantity(quantity).filter(|&v| is_valid(v)) else {
            dropped += 1;
            continue;
        };

        bucket.push(StationValue {
            station_id: record.station_id,
            latitude,
            longitude,
            value: convert(raw),
        });
    }

    debug!(
        quantity = quantity.element(),
        records = records.len(),
        dropped,
        timestamps = buckets.len(),
        "Binned observations"
    );

    buckets
}

/// Bin with the quantity, converter and validity rule of `variable`.
pub fn bin_variable(records: &[ObservationRecord], variable: Variable) -> TimestampBuckets {
    bin(
        records,
        variable.quantity(),
        |v| variable.convert(v),
        |v| variable.is_valid(v),
    )
}

/// Total number of values across all buckets.
pub fn retained_count(buckets: &TimestampBuckets) -> usize {
    buckets.values().map(Vec::len).sum()
}
