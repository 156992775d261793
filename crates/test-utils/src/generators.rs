//! Test data generators for creating synthetic weather-like data.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use crate::fixtures::{landsyn_row, srew_row, RawRow};

/// Creates a grid of Kelvin temperatures rising linearly from `start_k`
/// by `step_k` per cell in row-major order.
///
/// # Example
///
/// ```
/// use test_utils::create_kelvin_grid;
///
/// let grid = create_kelvin_grid(3, 2, 270.0, 1.5);
/// assert_eq!(grid.len(), 6);
/// assert_eq!(grid[4], 276.0);
/// ```
pub fn create_kelvin_grid(width: usize, height: usize, start_k: f32, step_k: f32) -> Vec<f32> {
    (0..width * height)
        .map(|i| start_k + step_k * i as f32)
        .collect()
}

/// Hourly land synoptic rows for one station over `hours`, with the air
/// temperature climbing by one Kelvin per hour from `start_k`.
pub fn hourly_landsyn_rows(
    station: (u32, f64, f64),
    (year, month, day): (i32, u32, u32),
    hours: std::ops::Range<u32>,
    start_k: f64,
) -> Vec<RawRow> {
    hours
        .enumerate()
        .map(|(i, hour)| {
            landsyn_row(
                station,
                (year, month, day, hour, 0),
                Some(start_k + i as f64),
                Some(5.0),
                Some(20000.0),
            )
        })
        .collect()
}

/// Hourly rain gauge rows for one station, all with the same total.
pub fn hourly_srew_rows(
    station: (u32, f64, f64),
    (year, month, day): (i32, u32, u32),
    hours: std::ops::Range<u32>,
    precipitation_mm: f64,
) -> Vec<RawRow> {
    hours
        .map(|hour| srew_row(station, (year, month, day, hour), Some(precipitation_mm)))
        .collect()
}
