//! Value quantization: continuous normalization and half-open bin lookup.
//!
//! [`bin_index`] is the single bin rule for the whole crate. The quantized
//! colour map and [`normalize_bucketed`] both call it, so the colour drawn
//! for a value always matches the legend entry for the same bounds.

use crate::error::{ColourMapError, Result};

/// What to do with a value below the first bound or at/above the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfRange {
    /// Use the nearest valid bin.
    #[default]
    Clamp,
    /// Fail with [`ColourMapError::ValueOutOfRange`].
    Strict,
}

/// Normalize `value` into `[0, 1]` over `[min, max]`.
///
/// Values outside the range are clamped to the ends.
pub fn normalize_continuous(value: f64, min: f64, max: f64) -> Result<f64> {
    if max == min {
        return Err(ColourMapError::DegenerateRange(min));
    }
    Ok(((value - min) / (max - min)).clamp(0.0, 1.0))
}

/// Normalized legend position of the bin holding `value`: `i / num_bins`.
pub fn normalize_bucketed(value: f64, bounds: &[f64], mode: OutOfRange) -> Result<f64> {
    let index = bin_index(value, bounds, mode)?;
    Ok(index as f64 / (bounds.len() - 1) as f64)
}

/// Smallest `i` with `bounds[i] <= value < bounds[i + 1]`.
///
/// `bounds` must be strictly increasing with at least two entries. NaN is
/// out of range in both modes.
pub fn bin_index(value: f64, bounds: &[f64], mode: OutOfRange) -> Result<usize> {
    validate_bounds(bounds)?;
    let num_bins = bounds.len() - 1;
    let lower = bounds[0];
    let upper = bounds[num_bins];

    let out_of_range = || ColourMapError::ValueOutOfRange { value, lower, upper };

    if value.is_nan() {
        return Err(out_of_range());
    }
    if value < lower {
        return match mode {
            OutOfRange::Clamp => Ok(0),
            OutOfRange::Strict => Err(out_of_range()),
        };
    }
    if value >= upper {
        return match mode {
            OutOfRange::Clamp => Ok(num_bins - 1),
            OutOfRange::Strict => Err(out_of_range()),
        };
    }

    // First bound strictly above the value closes the bin.
    let above = bounds.partition_point(|&b| b <= value);
    Ok(above - 1)
}

/// Check that `bounds` define at least one bin and are strictly increasing.
pub fn validate_bounds(bounds: &[f64]) -> Result<()> {
    if bounds.len() < 2 {
        return Err(ColourMapError::InvalidBounds(format!(
            "need at least 2 bounds, got {}",
            bounds.len()
        )));
    }
    if bounds.iter().any(|b| !b.is_finite()) {
        return Err(ColourMapError::InvalidBounds("bounds must be finite".to_string()));
    }
    if let Some(i) = bounds.windows(2).position(|w| w[1] <= w[0]) {
        return Err(ColourMapError::InvalidBounds(format!(
            "bounds not strictly increasing at index {} ({} then {})",
            i + 1,
            bounds[i],
            bounds[i + 1]
        )));
    }
    Ok(())
}
