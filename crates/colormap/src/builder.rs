//! Colour map construction.
//!
//! Three variants share one contract, a pure function to [`Rgba`]:
//!
//! - [`LinearColourMap`]: position in `[0, 1]` to an interpolated table colour
//! - [`NonLinearColourMap`]: a value in level units, warped so that each
//!   supplied level lands on an equal colour step
//! - [`QuantizedColourMap`]: a value to one of N discrete colours over N
//!   half-open bins

use crate::error::{ColourMapError, Result};
use crate::quantize::{bin_index, validate_bounds, OutOfRange};
use crate::table::{ColourTable, Rgba};

/// Table lookup by normalized position.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearColourMap {
    table: ColourTable,
}

impl LinearColourMap {
    /// Colour at position `t`; clamped to `[0, 1]`, NaN is transparent.
    pub fn colour_at(&self, t: f64) -> Rgba {
        if t.is_nan() {
            return Rgba::transparent();
        }
        let colours = self.table.colours();
        let last = colours.len() - 1;
        let pos = t.clamp(0.0, 1.0) * last as f64;
        let lower = (pos.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        colours[lower]
            .lerp(colours[upper], pos - lower as f64)
            .with_alpha(1.0)
    }

    pub fn table(&self) -> &ColourTable {
        &self.table
    }
}

/// Level-weighted colour map.
///
/// Anchors are `x[i] = levels[i] / max(levels)` and `y[i] = i / (n - 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NonLinearColourMap {
    linear: LinearColourMap,
    levels: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl NonLinearColourMap {
    /// Colour for `value`, expressed in the same units as the levels.
    pub fn colour_for(&self, value: f64) -> Rgba {
        if value.is_nan() {
            return Rgba::transparent();
        }
        self.linear.colour_at(self.warp(value))
    }

    /// Position on the linear map for `value`; clamped at both ends.
    pub fn warp(&self, value: f64) -> f64 {
        let max = self.levels[self.levels.len() - 1];
        interpolate_clamped(value / max, &self.x, &self.y)
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn linear(&self) -> &LinearColourMap {
        &self.linear
    }
}

/// One colour per half-open bin `[bounds[i], bounds[i + 1])`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedColourMap {
    table: ColourTable,
    bounds: Vec<f64>,
    mode: OutOfRange,
}

impl QuantizedColourMap {
    pub fn bin_for(&self, value: f64) -> Result<usize> {
        bin_index(value, &self.bounds, self.mode)
    }

    pub fn colour_for(&self, value: f64) -> Result<Rgba> {
        let index = self.bin_for(value)?;
        Ok(self.colour_of_bin(index))
    }

    /// Colour of bin `index`, saturating at the last bin.
    pub fn colour_of_bin(&self, index: usize) -> Rgba {
        let colours = self.table.colours();
        colours[index.min(colours.len() - 1)].with_alpha(1.0)
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    pub fn num_bins(&self) -> usize {
        self.bounds.len() - 1
    }

    pub fn mode(&self) -> OutOfRange {
        self.mode
    }
}

/// Any of the three colour map variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ColourMap {
    Linear(LinearColourMap),
    NonLinear(NonLinearColourMap),
    Quantized(QuantizedColourMap),
}

impl ColourMap {
    /// Evaluate the map.
    ///
    /// `value` is a normalized position for [`ColourMap::Linear`] and a raw
    /// value in data units for the other two variants.
    pub fn colour(&self, value: f64) -> Result<Rgba> {
        match self {
            ColourMap::Linear(map) => Ok(map.colour_at(value)),
            ColourMap::NonLinear(map) => Ok(map.colour_for(value)),
            ColourMap::Quantized(map) => map.colour_for(value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColourMap::Linear(map) => map.table.len(),
            ColourMap::NonLinear(map) => map.linear.table.len(),
            ColourMap::Quantized(map) => map.table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the colour map variants from a [`ColourTable`].
pub struct ColourMapBuilder;

impl ColourMapBuilder {
    pub fn build_linear(table: ColourTable) -> LinearColourMap {
        LinearColourMap { table }
    }

    /// `levels` must be positive, strictly increasing, with at least two entries.
    pub fn build_non_linear(table: ColourTable, levels: &[f64]) -> Result<NonLinearColourMap> {
        if levels.len() < 2 {
            return Err(ColourMapError::InvalidLevels(format!(
                "need at least 2 levels, got {}",
                levels.len()
            )));
        }
        if levels.iter().any(|&l| !(l.is_finite() && l > 0.0)) {
            return Err(ColourMapError::InvalidLevels(
                "levels must be finite and positive".to_string(),
            ));
        }
        if levels.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ColourMapError::InvalidLevels(
                "levels must be strictly increasing".to_string(),
            ));
        }

        let max = levels[levels.len() - 1];
        let steps = (levels.len() - 1) as f64;
        let x = levels.iter().map(|l| l / max).collect();
        let y = (0..levels.len()).map(|i| i as f64 / steps).collect();

        Ok(NonLinearColourMap {
            linear: Self::build_linear(table),
            levels: levels.to_vec(),
            x,
            y,
        })
    }

    /// `bounds` must be strictly increasing and one longer than the table.
    pub fn build_quantized(
        table: ColourTable,
        bounds: &[f64],
        mode: OutOfRange,
    ) -> Result<QuantizedColourMap> {
        validate_bounds(bounds)?;
        if table.len() != bounds.len() - 1 {
            return Err(ColourMapError::InvalidBounds(format!(
                "{} bounds define {} bins but the table has {} colours",
                bounds.len(),
                bounds.len() - 1,
                table.len()
            )));
        }
        Ok(QuantizedColourMap {
            table,
            bounds: bounds.to_vec(),
            mode,
        })
    }
}

/// Piecewise-linear interpolation through `(xs, ys)`, clamped at the ends.
///
/// Returns `ys[k]` exactly when `x == xs[k]`.
fn interpolate_clamped(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let last = xs.len() - 1;
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[last] {
        return ys[last];
    }
    let upper = xs.partition_point(|&xi| xi < x);
    if xs[upper] == x {
        return ys[upper];
    }
    let (x0, x1) = (xs[upper - 1], xs[upper]);
    let (y0, y1) = (ys[upper - 1], ys[upper]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
