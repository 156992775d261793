//! Common test fixtures for observation and colour map tests.
//!
//! Raw rows are `Vec<Option<f64>>` in the positional order of the element
//! lists requested from the observation store; `None` is a masked value.

/// Raw row as returned by an observation fetch.
pub type RawRow = Vec<Option<f64>>;

/// Processing dates used across the tests.
pub mod dates {
    /// The date most fixtures are stamped with.
    pub const SUMMER_DAY: &str = "20240601";

    /// A leap day, for padding and calendar checks.
    pub const LEAP_DAY: &str = "20240229";

    /// Not a calendar date.
    pub const INVALID: &str = "20241341";
}

/// Station positions (WMO number, latitude, longitude).
pub mod stations {
    pub const HEATHROW: (u32, f64, f64) = (3772, 51.479, -0.449);
    pub const LERWICK: (u32, f64, f64) = (3005, 60.139, -1.183);
    pub const CAMBORNE: (u32, f64, f64) = (3808, 50.218, -5.327);
    pub const ABERPORTH: (u32, f64, f64) = (3502, 52.139, -4.570);
}

/// Bin bounds used by the discrete variables.
pub mod bounds {
    pub const VISIBILITY: [f64; 12] = [
        0.0, 50.0, 100.0, 200.0, 1000.0, 5000.0, 10000.0, 20000.0, 30000.0, 50000.0, 70000.0,
        75001.0,
    ];

    pub const PRECIPITATION: [f64; 12] =
        [0.0, 0.0001, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 100.0];
}

/// A land synoptic row:
/// `id lat lon year month day hour minute air_temp wind_speed visibility`.
pub fn landsyn_row(
    station: (u32, f64, f64),
    (year, month, day, hour, minute): (i32, u32, u32, u32, u32),
    air_temperature_k: Option<f64>,
    wind_speed_ms: Option<f64>,
    visibility_m: Option<f64>,
) -> RawRow {
    vec![
        Some(station.0 as f64),
        Some(station.1),
        Some(station.2),
        Some(year as f64),
        Some(month as f64),
        Some(day as f64),
        Some(hour as f64),
        Some(minute as f64),
        air_temperature_k,
        wind_speed_ms,
        visibility_m,
    ]
}

/// A rain gauge row: `id lat lon year month day hour precip_1h`.
pub fn srew_row(
    station: (u32, f64, f64),
    (year, month, day, hour): (i32, u32, u32, u32),
    precipitation_mm: Option<f64>,
) -> RawRow {
    vec![
        Some(station.0 as f64),
        Some(station.1),
        Some(station.2),
        Some(year as f64),
        Some(month as f64),
        Some(day as f64),
        Some(hour as f64),
        precipitation_mm,
    ]
}

/// Mask the value at `position` in a raw row.
pub fn masked(mut row: RawRow, position: usize) -> RawRow {
    if let Some(slot) = row.get_mut(position) {
        *slot = None;
    }
    row
}
