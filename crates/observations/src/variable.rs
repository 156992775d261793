//! Observed variables and their immutable plot configuration.
//!
//! [`Variable`] is the closed set of plottable observations. Everything that
//! differs between them (source, unit conversion, validity, value range,
//! colour table, legend) is answered by matching on the variant.
//! [`PlotConfig`] is built once per variable before processing starts and
//! owns that variable's colour map.

use colormap::{
    normalize_bucketed, normalize_continuous, BuiltinTable, ColourMap, ColourMapBuilder,
    OutOfRange, Rgba,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::{ObservationSourceKind, Quantity};

/// Kelvin to Celsius offset.
pub const KELVIN_OFFSET: f64 = 273.15;

/// m/s to knots factor.
pub const MS_TO_KNOTS: f64 = 1.944;

/// A plottable observed variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    WindSpeed,
    Visibility,
    Precipitation,
}

/// How values map onto the colour scale.
#[derive(Debug, Clone, PartialEq)]
pub enum RangePolicy {
    /// Linear over `[min, max]`.
    Continuous { min: f64, max: f64 },
    /// One colour per half-open bin.
    Bounded { bounds: Vec<f64> },
}

/// Which ends of the legend bar get an overflow arrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extend {
    Neither,
    Min,
    Max,
    Both,
}

/// Display metadata handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    pub label: String,
    /// Tick positions in data units for continuous scales, in normalized
    /// legend units for bounded ones.
    pub ticks: Vec<f64>,
    pub tick_labels: Vec<String>,
    pub extend: Extend,
    pub title_size: f32,
    pub dpi: u32,
    pub label_font_size: Option<f32>,
    pub label_rotation: Option<f32>,
}

impl Variable {
    pub const ALL: [Variable; 4] = [
        Variable::Temperature,
        Variable::WindSpeed,
        Variable::Visibility,
        Variable::Precipitation,
    ];

    /// Short identifier, also used for config keys and output folders.
    pub fn name(&self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::WindSpeed => "wind_speed",
            Variable::Visibility => "visibility",
            Variable::Precipitation => "precipitation",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Variable::Temperature => "screen temperature",
            Variable::WindSpeed => "wind speed",
            Variable::Visibility => "visibility",
            Variable::Precipitation => "precipitation",
        }
    }

    pub fn source(&self) -> ObservationSourceKind {
        match self {
            Variable::Temperature | Variable::WindSpeed | Variable::Visibility => {
                ObservationSourceKind::LandSynoptic
            }
            Variable::Precipitation => ObservationSourceKind::RainGauge,
        }
    }

    pub fn quantity(&self) -> Quantity {
        match self {
            Variable::Temperature => Quantity::AirTemperature,
            Variable::WindSpeed => Quantity::WindSpeed,
            Variable::Visibility => Quantity::Visibility,
            Variable::Precipitation => Quantity::HourlyPrecipitation,
        }
    }

    /// Convert a retained raw value into display units.
    pub fn convert(&self, raw: f64) -> f64 {
        match self {
            Variable::Temperature => raw - KELVIN_OFFSET,
            Variable::WindSpeed => raw * MS_TO_KNOTS,
            Variable::Visibility | Variable::Precipitation => raw,
        }
    }

    /// Whether a present raw value is a real measurement.
    ///
    /// Rain gauges encode trace as `-1` and nil reports as `-9999999`.
    pub fn is_valid(&self, raw: f64) -> bool {
        match self {
            Variable::Precipitation => raw >= 0.0,
            Variable::Temperature | Variable::WindSpeed | Variable::Visibility => !raw.is_nan(),
        }
    }

    pub fn range_policy(&self) -> RangePolicy {
        match self {
            Variable::Temperature => RangePolicy::Continuous { min: -45.0, max: 45.0 },
            Variable::WindSpeed => RangePolicy::Continuous { min: 0.0, max: 80.0 },
            Variable::Visibility => RangePolicy::Bounded {
                bounds: vec![
                    0.0, 50.0, 100.0, 200.0, 1000.0, 5000.0, 10000.0, 20000.0, 30000.0, 50000.0,
                    70000.0, 75001.0,
                ],
            },
            Variable::Precipitation => RangePolicy::Bounded {
                bounds: vec![0.0, 0.0001, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 100.0],
            },
        }
    }

    pub fn colour_table(&self) -> BuiltinTable {
        match self {
            Variable::Temperature => BuiltinTable::Temperature,
            Variable::WindSpeed => BuiltinTable::Wind,
            Variable::Visibility => BuiltinTable::Visibility,
            Variable::Precipitation => BuiltinTable::Precipitation,
        }
    }

    pub fn legend(&self) -> Legend {
        let strings = |labels: &[&str]| -> Vec<String> {
            labels.iter().map(|s| s.to_string()).collect()
        };
        let stepped = |min: i32, max: i32, step: usize| -> Vec<f64> {
            (min..=max).step_by(step).map(f64::from).collect()
        };
        // Bounded legends put one tick at the start of each bin.
        let bin_ticks = |bins: usize| -> Vec<f64> {
            (0..bins).map(|i| i as f64 / bins as f64).collect()
        };

        match self {
            Variable::Temperature => Legend {
                label: "Temp (°C)".to_string(),
                ticks: stepped(-45, 45, 5),
                tick_labels: Vec::new(),
                extend: Extend::Both,
                title_size: 6.0,
                dpi: 162,
                label_font_size: Some(5.0),
                label_rotation: None,
            },
            Variable::WindSpeed => Legend {
                label: "Windspeed (knots)".to_string(),
                ticks: stepped(0, 80, 10),
                tick_labels: Vec::new(),
                extend: Extend::Max,
                title_size: 5.5,
                dpi: 170,
                label_font_size: None,
                label_rotation: None,
            },
            Variable::Visibility => Legend {
                label: "Visibility (m)".to_string(),
                ticks: bin_ticks(11),
                tick_labels: strings(&[
                    "", "50m", "100m", "200m", "1km", "5km", "10km", "20km", "30km", "50km",
                    "70km",
                ]),
                extend: Extend::Neither,
                title_size: 5.5,
                dpi: 170,
                label_font_size: Some(5.0),
                label_rotation: None,
            },
            Variable::Precipitation => Legend {
                label: "Hourly Precip (mm)".to_string(),
                ticks: bin_ticks(11),
                tick_labels: strings(&[
                    "0", ">0", "0.1-0.25", "0.25-0.5", "0.5-1", "1-2", "2-4", "4-8", "8-16",
                    "16-32", "32+",
                ]),
                extend: Extend::Neither,
                title_size: 5.5,
                dpi: 170,
                label_font_size: Some(4.0),
                label_rotation: Some(50.0),
            },
        }
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable per-variable plotting configuration.
#[derive(Debug, Clone)]
pub struct PlotConfig {
    variable: Variable,
    range: RangePolicy,
    colour_map: ColourMap,
    legend: Legend,
}

impl PlotConfig {
    /// Build the configuration, clamping out-of-range bin lookups.
    pub fn new(variable: Variable) -> Result<Self> {
        Self::with_out_of_range(variable, OutOfRange::Clamp)
    }

    /// Build the configuration with an explicit out-of-range policy for
    /// bounded variables.
    pub fn with_out_of_range(variable: Variable, mode: OutOfRange) -> Result<Self> {
        let table = variable.colour_table().load()?;
        let range = variable.range_policy();
        let colour_map = match &range {
            RangePolicy::Continuous { min, max } => {
                // Reject a degenerate range before any value is plotted.
                normalize_continuous(*min, *min, *max)?;
                ColourMap::Linear(ColourMapBuilder::build_linear(table))
            }
            RangePolicy::Bounded { bounds } => {
                ColourMap::Quantized(ColourMapBuilder::build_quantized(table, bounds, mode)?)
            }
        };

        Ok(Self {
            variable,
            range,
            colour_map,
            legend: variable.legend(),
        })
    }

    pub fn variable(&self) -> Variable {
        self.variable
    }

    pub fn range(&self) -> &RangePolicy {
        &self.range
    }

    pub fn colour_map(&self) -> &ColourMap {
        &self.colour_map
    }

    pub fn legend(&self) -> &Legend {
        &self.legend
    }

    /// Position of a display-unit value along the legend bar, in `[0, 1]`.
    pub fn legend_position(&self, value: f64) -> Result<f64> {
        let position = match &self.range {
            RangePolicy::Continuous { min, max } => normalize_continuous(value, *min, *max)?,
            RangePolicy::Bounded { bounds } => {
                let mode = match &self.colour_map {
                    ColourMap::Quantized(map) => map.mode(),
                    _ => OutOfRange::Clamp,
                };
                normalize_bucketed(value, bounds, mode)?
            }
        };
        Ok(position)
    }

    /// Colour for a display-unit value.
    pub fn colour_for(&self, value: f64) -> Result<Rgba> {
        let colour = match &self.colour_map {
            ColourMap::Quantized(map) => map.colour_for(value)?,
            map => map.colour(self.legend_position(value)?)?,
        };
        Ok(colour)
    }
}
