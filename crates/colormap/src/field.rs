//! Colouring of gridded forecast fields.
//!
//! Grids arrive already decoded as row-major `f32` values in source units.
//! Each [`ForecastField`] knows its unit conversion and colour map; the
//! result of [`colour_grid`] is RGBA bytes, 4 per cell.

use rayon::prelude::*;

use crate::builder::{ColourMap, ColourMapBuilder};
use crate::error::{ColourMapError, Result};
use crate::quantize::{normalize_continuous, OutOfRange};
use crate::table::{precipitation_gradient, BuiltinTable, ColourTable, GradientSegments, Rgb, Rgba};

/// Rain-rate colour levels in mm/h.
pub const RAIN_RATE_LEVELS: [f64; 9] = [0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0];

/// Screen temperature display range in °C.
pub const TEMPERATURE_RANGE: (f64, f64) = (-45.0, 45.0);

/// Cloud fraction bin bounds in octas.
pub const CLOUD_LEVELS: [f64; 9] = [0.05, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];

/// Entries sampled from the rain-rate gradient.
const RAIN_RATE_TABLE_SIZE: usize = 256;

/// Cloud layers, drawn low first so higher cloud lies on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CloudLayer {
    Low,
    Mid,
    High,
}

impl CloudLayer {
    pub const ALL: [CloudLayer; 3] = [CloudLayer::Low, CloudLayer::Mid, CloudLayer::High];

    /// Full-cover colour of the layer.
    pub fn hue(&self) -> Rgb {
        match self {
            CloudLayer::Low => Rgb::new(1.0, 0.0, 0.0),
            CloudLayer::Mid => Rgb::new(0.0, 0.6, 0.0),
            CloudLayer::High => Rgb::new(0.0, 0.0, 1.0),
        }
    }
}

/// Gridded forecast layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForecastField {
    /// Dynamic plus convective rain rate, kg m-2 s-1 in the source.
    RainRate,
    /// 1.5 m air temperature, Kelvin in the source.
    Temperature1p5m,
    /// Cloud fraction of one layer, octas in the source.
    Cloud(CloudLayer),
}

impl ForecastField {
    /// Convert one value from source units to display units.
    pub fn convert(&self, value: f32) -> f32 {
        match self {
            // kg m-2 s-1 is mm/s
            ForecastField::RainRate => value * 3600.0,
            ForecastField::Temperature1p5m => value - 273.15,
            ForecastField::Cloud(_) => value,
        }
    }

    /// Convert a whole grid in place.
    pub fn convert_grid(&self, data: &mut [f32]) {
        data.par_iter_mut().for_each(|v| *v = self.convert(*v));
    }
}

/// Sum the dynamic and convective rain-rate grids, converting both to mm/h.
pub fn combine_rain_rates(dynamic: &[f32], convective: &[f32]) -> Result<Vec<f32>> {
    if dynamic.len() != convective.len() {
        return Err(ColourMapError::GridMismatch {
            expected: dynamic.len(),
            actual: convective.len(),
        });
    }
    let field = ForecastField::RainRate;
    Ok(dynamic
        .par_iter()
        .zip(convective.par_iter())
        .map(|(&d, &c)| field.convert(d) + field.convert(c))
        .collect())
}

/// A field together with its colour map and display range.
#[derive(Debug, Clone)]
pub struct FieldStyle {
    field: ForecastField,
    map: ColourMap,
    min: f64,
    max: f64,
    /// Bin `i` of a quantized map gets alpha `(i + 1) / num_bins`.
    alpha_ramp: bool,
}

impl FieldStyle {
    pub fn new(field: ForecastField) -> Result<Self> {
        match field {
            ForecastField::RainRate => {
                let table =
                    ColourTable::from_gradient(&precipitation_gradient(), RAIN_RATE_TABLE_SIZE)?;
                let map = ColourMapBuilder::build_non_linear(table, &RAIN_RATE_LEVELS)?;
                Ok(Self {
                    field,
                    map: ColourMap::NonLinear(map),
                    min: RAIN_RATE_LEVELS[0],
                    max: RAIN_RATE_LEVELS[RAIN_RATE_LEVELS.len() - 1],
                    alpha_ramp: false,
                })
            }
            ForecastField::Temperature1p5m => {
                let table = BuiltinTable::Temperature.load()?;
                Ok(Self {
                    field,
                    map: ColourMap::Linear(ColourMapBuilder::build_linear(table)),
                    min: TEMPERATURE_RANGE.0,
                    max: TEMPERATURE_RANGE.1,
                    alpha_ramp: false,
                })
            }
            ForecastField::Cloud(layer) => {
                let hue = layer.hue();
                let pale = hue.lerp(Rgb::new(1.0, 1.0, 1.0), 0.6);
                let table = ColourTable::from_gradient(
                    &GradientSegments::evenly_spaced(&[pale, hue]),
                    CLOUD_LEVELS.len() - 1,
                )?;
                let map = ColourMapBuilder::build_quantized(table, &CLOUD_LEVELS, OutOfRange::Clamp)?;
                Ok(Self {
                    field,
                    map: ColourMap::Quantized(map),
                    min: CLOUD_LEVELS[0],
                    max: CLOUD_LEVELS[CLOUD_LEVELS.len() - 1],
                    alpha_ramp: true,
                })
            }
        }
    }

    pub fn field(&self) -> ForecastField {
        self.field
    }

    pub fn colour_map(&self) -> &ColourMap {
        &self.map
    }

    /// Colour for a value already in display units.
    ///
    /// NaN and values outside the display range are transparent, matching
    /// filled contours that only shade between their outermost levels.
    pub fn colour(&self, value: f64) -> Rgba {
        if value.is_nan() || value < self.min || value > self.max {
            return Rgba::transparent();
        }
        let lookup = match &self.map {
            ColourMap::Linear(map) => {
                normalize_continuous(value, self.min, self.max).map(|t| map.colour_at(t))
            }
            ColourMap::NonLinear(map) => Ok(map.colour_for(value)),
            ColourMap::Quantized(map) => map.bin_for(value).map(|bin| {
                let colour = map.colour_of_bin(bin);
                if self.alpha_ramp {
                    Rgba {
                        a: (bin + 1) as f64 / map.num_bins() as f64,
                        ..colour
                    }
                } else {
                    colour
                }
            }),
        };
        lookup.unwrap_or_else(|_| Rgba::transparent())
    }
}

/// Colour a row-major grid of display-unit values into RGBA bytes.
pub fn colour_grid(
    data: &[f32],
    width: usize,
    height: usize,
    style: &FieldStyle,
) -> Result<Vec<u8>> {
    let expected = width * height;
    if data.len() != expected {
        return Err(ColourMapError::GridMismatch {
            expected,
            actual: data.len(),
        });
    }

    let mut pixels = vec![0u8; expected * 4];
    if expected == 0 {
        return Ok(pixels);
    }

    pixels
        .par_chunks_mut(width * 4)
        .zip(data.par_chunks(width))
        .for_each(|(row_pixels, row_values)| {
            for (pixel, &value) in row_pixels.chunks_exact_mut(4).zip(row_values) {
                pixel.copy_from_slice(&style.colour(value as f64).to_bytes());
            }
        });

    Ok(pixels)
}

/// Draw `top` over `bottom` in place, both RGBA bytes of the same grid.
pub fn overlay(bottom: &mut [u8], top: &[u8]) -> Result<()> {
    if bottom.len() != top.len() {
        return Err(ColourMapError::GridMismatch {
            expected: bottom.len(),
            actual: top.len(),
        });
    }

    bottom
        .par_chunks_mut(4)
        .zip(top.par_chunks(4))
        .for_each(|(under, over)| {
            let top_a = over[3] as f64 / 255.0;
            if top_a == 0.0 {
                return;
            }
            let under_a = under[3] as f64 / 255.0;
            let out_a = top_a + under_a * (1.0 - top_a);
            for c in 0..3 {
                let blended = (over[c] as f64 * top_a + under[c] as f64 * under_a * (1.0 - top_a))
                    / out_a;
                under[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            under[3] = (out_a * 255.0).round() as u8;
        });

    Ok(())
}
