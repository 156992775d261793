//! Observation sources and decoding of their raw rows.
//!
//! The observation store answers a request with one row per report, each a
//! list of optional numbers in the order of the requested elements. A `None`
//! is a masked (missing) value, distinct from zero.

use serde::{Deserialize, Serialize};

use crate::error::{ObservationError, Result};
use crate::time::TimestampKey;

/// A raw report row, positionally matching the requested elements.
pub type RawRecord = Vec<Option<f64>>;

/// A measured quantity carried by an observation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// Screen air temperature, Kelvin.
    AirTemperature,
    /// 10 m wind speed, m/s.
    WindSpeed,
    /// Horizontal visibility, metres.
    Visibility,
    /// Precipitation total over the past hour, mm.
    HourlyPrecipitation,
}

impl Quantity {
    /// Element name in the observation store.
    pub fn element(&self) -> &'static str {
        match self {
            Quantity::AirTemperature => "SRFC_AIR_TMPR",
            Quantity::WindSpeed => "SRFC_WIND_SPED",
            Quantity::Visibility => "HRZL_VSBLY",
            Quantity::HourlyPrecipitation => "Q1HOUR_PRCTN_AMNT",
        }
    }
}

/// The observation store subtypes the plotter reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSourceKind {
    /// Land synoptic reports, minute resolution.
    LandSynoptic,
    /// Rain gauge reports, hourly.
    RainGauge,
}

const LANDSYN_ELEMENTS: [&str; 11] = [
    "WMO_STTN_NMBR",
    "LTTD",
    "LNGD",
    "YEAR",
    "MNTH",
    "DAY",
    "HOUR",
    "MINT",
    "SRFC_AIR_TMPR",
    "SRFC_WIND_SPED",
    "HRZL_VSBLY",
];

const SREW_ELEMENTS: [&str; 8] = [
    "WMO_STTN_INDX_NMBR",
    "LTTD",
    "LNGD",
    "YEAR",
    "MNTH",
    "DAY",
    "HOUR",
    "Q1HOUR_PRCTN_AMNT",
];

const LANDSYN_QUANTITIES: [(Quantity, usize); 3] = [
    (Quantity::AirTemperature, 8),
    (Quantity::WindSpeed, 9),
    (Quantity::Visibility, 10),
];

const SREW_QUANTITIES: [(Quantity, usize); 1] = [(Quantity::HourlyPrecipitation, 7)];

impl ObservationSourceKind {
    pub const ALL: [ObservationSourceKind; 2] =
        [ObservationSourceKind::LandSynoptic, ObservationSourceKind::RainGauge];

    /// Subtype name in the observation store.
    pub fn subtype(&self) -> &'static str {
        match self {
            ObservationSourceKind::LandSynoptic => "LNDSYN",
            ObservationSourceKind::RainGauge => "SREW",
        }
    }

    /// Elements requested from the store, in row order.
    pub fn elements(&self) -> &'static [&'static str] {
        match self {
            ObservationSourceKind::LandSynoptic => &LANDSYN_ELEMENTS,
            ObservationSourceKind::RainGauge => &SREW_ELEMENTS,
        }
    }

    /// Quantities carried by this source and their row positions.
    pub fn quantities(&self) -> &'static [(Quantity, usize)] {
        match self {
            ObservationSourceKind::LandSynoptic => &LANDSYN_QUANTITIES,
            ObservationSourceKind::RainGauge => &SREW_QUANTITIES,
        }
    }

    /// Whether reports carry a minute; hourly sources are stamped `:00`.
    pub fn reports_minutes(&self) -> bool {
        matches!(self, ObservationSourceKind::LandSynoptic)
    }

    /// Decode one raw row.
    ///
    /// Fails when the row is short or when the station id or any date-time
    /// part is masked, non-integral or out of range. Masked positions and
    /// quantities are kept as `None` for the binner to filter.
    pub fn decode(&self, row: &[Option<f64>]) -> Result<ObservationRecord> {
        let expected = self.elements().len();
        if row.len() < expected {
            return Err(ObservationError::UndecodableRecord(format!(
                "{} row has {} values, expected {}",
                self.subtype(),
                row.len(),
                expected
            )));
        }

        let station_id = integral(row, 0, "station id", 0, u32::MAX as i64)? as u32;
        let year = integral(row, 3, "year", 1, 9999)? as i32;
        let month = integral(row, 4, "month", 1, 12)? as u32;
        let day = integral(row, 5, "day", 1, 31)? as u32;
        let hour = integral(row, 6, "hour", 0, 23)? as u32;
        let minute = if self.reports_minutes() {
            integral(row, 7, "minute", 0, 59)? as u32
        } else {
            0
        };

        let mut record =
            ObservationRecord::new(station_id, row[1], row[2], (year, month, day, hour, minute));
        for &(quantity, position) in self.quantities() {
            record = record.with_quantity(quantity, row[position]);
        }
        Ok(record)
    }
}

fn integral(row: &[Option<f64>], position: usize, name: &str, min: i64, max: i64) -> Result<i64> {
    let value = row[position].ok_or_else(|| {
        ObservationError::UndecodableRecord(format!("{} is masked", name))
    })?;
    if value.fract() != 0.0 || value < min as f64 || value > max as f64 {
        return Err(ObservationError::UndecodableRecord(format!(
            "{} {} is not an integer in [{}, {}]",
            name, value, min, max
        )));
    }
    Ok(value as i64)
}

/// One station report.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub station_id: u32,
    /// `None` when masked.
    pub latitude: Option<f64>,
    /// `None` when masked.
    pub longitude: Option<f64>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    quantities: Vec<(Quantity, Option<f64>)>,
}

impl ObservationRecord {
    pub fn new(
        station_id: u32,
        latitude: Option<f64>,
        longitude: Option<f64>,
        (year, month, day, hour, minute): (i32, u32, u32, u32, u32),
    ) -> Self {
        Self {
            station_id,
            latitude,
            longitude,
            year,
            month,
            day,
            hour,
            minute,
            quantities: Vec::new(),
        }
    }

    /// Attach a measured quantity; `None` marks it masked.
    pub fn with_quantity(mut self, quantity: Quantity, value: Option<f64>) -> Self {
        match self.quantities.iter_mut().find(|(q, _)| *q == quantity) {
            Some(slot) => slot.1 = value,
            None => self.quantities.push((quantity, value)),
        }
        self
    }

    /// The measured value, or `None` when masked or not reported.
    pub fn quantity(&self, quantity: Quantity) -> Option<f64> {
        self.quantities
            .iter()
            .find(|(q, _)| *q == quantity)
            .and_then(|(_, v)| *v)
    }

    pub fn timestamp_key(&self) -> TimestampKey {
        TimestampKey::from_parts(self.year, self.month, self.day, self.hour, self.minute)
    }
}

/// Decode every row, dropping the undecodable ones.
///
/// Returns the records in input order and the number of rows dropped.
pub fn decode_rows(kind: ObservationSourceKind, rows: &[RawRecord]) -> (Vec<ObservationRecord>, usize) {
    let mut dropped = 0;
    let records = rows
        .iter()
        .filter_map(|row| match kind.decode(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(subtype = kind.subtype(), error = %e, "Dropping undecodable row");
                dropped += 1;
                None
            }
        })
        .collect();
    (records, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_positions_match_quantities() {
        for kind in ObservationSourceKind::ALL {
            for &(quantity, position) in kind.quantities() {
                assert_eq!(kind.elements()[position], quantity.element());
            }
        }
    }

    #[test]
    fn test_decode_hourly_source_forces_minute_zero() {
        let row = vec![
            Some(3005.0),
            Some(60.1),
            Some(-1.2),
            Some(2024.0),
            Some(6.0),
            Some(1.0),
            Some(7.0),
            Some(0.4),
        ];
        let record = ObservationSourceKind::RainGauge.decode(&row).unwrap();
        assert_eq!(record.minute, 0);
        assert_eq!(record.timestamp_key().as_str(), "202406010700");
        assert_eq!(record.quantity(Quantity::HourlyPrecipitation), Some(0.4));
    }

    #[test]
    fn test_decode_rejects_masked_or_fractional_time() {
        let mut row = vec![Some(1.0); 11];
        row[3] = Some(2024.0);
        row[6] = None;
        assert!(ObservationSourceKind::LandSynoptic.decode(&row).is_err());
        row[6] = Some(12.5);
        assert!(ObservationSourceKind::LandSynoptic.decode(&row).is_err());
        row[6] = Some(12.0);
        assert!(ObservationSourceKind::LandSynoptic.decode(&row).is_ok());
        assert!(ObservationSourceKind::LandSynoptic.decode(&row[..9]).is_err());
    }
}
