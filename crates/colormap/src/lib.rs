//! Colour tables and colour maps for weather map layers.
//!
//! Provides:
//! - Colour tables parsed from the legacy channel-major `.clr` format
//! - Linear, non-linear (level-weighted) and quantized colour maps
//! - Value quantization shared by colour lookup and legends
//! - Colouring of gridded forecast fields

pub mod builder;
pub mod error;
pub mod field;
pub mod quantize;
pub mod table;

pub use builder::{
    ColourMap, ColourMapBuilder, LinearColourMap, NonLinearColourMap, QuantizedColourMap,
};
pub use error::{ColourMapError, Result};
pub use field::{
    colour_grid, combine_rain_rates, overlay, CloudLayer, FieldStyle, ForecastField, CLOUD_LEVELS,
};
pub use quantize::{bin_index, normalize_bucketed, normalize_continuous, OutOfRange};
pub use table::{BuiltinTable, ColourTable, GradientSegments, Rgb, Rgba};
