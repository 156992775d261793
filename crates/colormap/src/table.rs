//! Colour lookup tables.
//!
//! Tables come either from the legacy `.clr` text format (a flat list of
//! integers in `[0, 255]`, all red values first, then all green, then all
//! blue) or from sampling a segmented gradient.

use crate::error::{ColourMapError, Result};

/// An opaque colour with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Linear blend towards `other`; `t` is clamped to `[0, 1]`.
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let t_inv = 1.0 - t;
        Rgb::new(
            self.r * t_inv + other.r * t,
            self.g * t_inv + other.g * t,
            self.b * t_inv + other.b * t,
        )
    }

    pub fn with_alpha(self, a: f64) -> Rgba {
        Rgba { r: self.r, g: self.g, b: self.b, a }
    }
}

/// Colour value in RGBA format, channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub fn transparent() -> Self {
        Self { r: 0.0, g: 0.0, b: 0.0, a: 0.0 }
    }

    /// Quantize to 8-bit channels for image output.
    pub fn to_bytes(self) -> [u8; 4] {
        let q = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

/// Immutable, non-empty sequence of RGB triples.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourTable {
    colours: Vec<Rgb>,
}

impl ColourTable {
    /// Build a table from channel-major bytes.
    ///
    /// The first `channel_count` values are the red channel, the next
    /// `channel_count` the green channel and the last `channel_count` the blue
    /// channel. Entry `i` of the table is `(red[i], green[i], blue[i]) / 255`.
    pub fn parse(raw: &[u8], channel_count: usize) -> Result<Self> {
        if raw.is_empty() || raw.len() % 3 != 0 {
            return Err(ColourMapError::MalformedColourTable(format!(
                "{} values is not a non-empty multiple of 3",
                raw.len()
            )));
        }
        if channel_count == 0 || raw.len() != 3 * channel_count {
            return Err(ColourMapError::MalformedColourTable(format!(
                "{} values does not hold 3 channels of {} entries",
                raw.len(),
                channel_count
            )));
        }

        let (red, rest) = raw.split_at(channel_count);
        let (green, blue) = rest.split_at(channel_count);
        let colours = red
            .iter()
            .zip(green)
            .zip(blue)
            .map(|((&r, &g), &b)| {
                Rgb::new(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0)
            })
            .collect();

        Ok(Self { colours })
    }

    /// Parse the whitespace-separated `.clr` text format.
    pub fn parse_text(text: &str, channel_count: usize) -> Result<Self> {
        let raw = text
            .split_whitespace()
            .map(|token| {
                token.parse::<u8>().map_err(|_| {
                    ColourMapError::MalformedColourTable(format!(
                        "'{}' is not an integer in [0, 255]",
                        token
                    ))
                })
            })
            .collect::<Result<Vec<u8>>>()?;
        Self::parse(&raw, channel_count)
    }

    /// Sample a segmented gradient at `n` evenly spaced positions.
    pub fn from_gradient(gradient: &GradientSegments, n: usize) -> Result<Self> {
        if n < 2 {
            return Err(ColourMapError::MalformedColourTable(format!(
                "a sampled gradient needs at least 2 entries, got {}",
                n
            )));
        }
        gradient.validate()?;

        let colours = (0..n)
            .map(|i| {
                let x = i as f64 / (n - 1) as f64;
                Rgb::new(
                    sample_channel(&gradient.red, x),
                    sample_channel(&gradient.green, x),
                    sample_channel(&gradient.blue, x),
                )
            })
            .collect();

        Ok(Self { colours })
    }

    pub fn len(&self) -> usize {
        self.colours.len()
    }

    /// Tables are never empty once built.
    pub fn is_empty(&self) -> bool {
        self.colours.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.colours.get(index).copied()
    }

    pub fn colours(&self) -> &[Rgb] {
        &self.colours
    }

    /// Flatten back into channel-major bytes (inverse of [`ColourTable::parse`]).
    pub fn to_channel_major_bytes(&self) -> Vec<u8> {
        let q = |c: f64| (c * 255.0).round() as u8;
        let mut out = Vec::with_capacity(self.colours.len() * 3);
        out.extend(self.colours.iter().map(|c| q(c.r)));
        out.extend(self.colours.iter().map(|c| q(c.g)));
        out.extend(self.colours.iter().map(|c| q(c.b)));
        out
    }
}

/// Per-channel piecewise-linear gradient.
///
/// Each channel is a list of `(x, value)` anchors with `x` strictly
/// increasing from `0.0` to `1.0` and `value` in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientSegments {
    pub red: Vec<(f64, f64)>,
    pub green: Vec<(f64, f64)>,
    pub blue: Vec<(f64, f64)>,
}

impl GradientSegments {
    /// Evenly spaced anchors built from a list of colours.
    pub fn evenly_spaced(colours: &[Rgb]) -> Self {
        let last = colours.len().saturating_sub(1).max(1) as f64;
        let anchors = |f: fn(&Rgb) -> f64| {
            colours
                .iter()
                .enumerate()
                .map(|(i, c)| (i as f64 / last, f(c)))
                .collect::<Vec<_>>()
        };
        Self {
            red: anchors(|c| c.r),
            green: anchors(|c| c.g),
            blue: anchors(|c| c.b),
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, channel) in [("red", &self.red), ("green", &self.green), ("blue", &self.blue)] {
            let (first, last) = match (channel.first(), channel.last()) {
                (Some(first), Some(last)) if channel.len() >= 2 => (first.0, last.0),
                _ => {
                    return Err(ColourMapError::MalformedColourTable(format!(
                        "{} channel needs at least 2 anchors",
                        name
                    )))
                }
            };
            if first != 0.0 || last != 1.0 {
                return Err(ColourMapError::MalformedColourTable(format!(
                    "{} channel must span x = 0 to 1, got {} to {}",
                    name, first, last
                )));
            }
            if channel.windows(2).any(|w| w[1].0 <= w[0].0) {
                return Err(ColourMapError::MalformedColourTable(format!(
                    "{} channel anchors must be strictly increasing",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn sample_channel(anchors: &[(f64, f64)], x: f64) -> f64 {
    let upper = anchors
        .iter()
        .position(|&(ax, _)| ax >= x)
        .unwrap_or(anchors.len() - 1);
    if upper == 0 || anchors[upper].0 == x {
        return anchors[upper].1;
    }
    let (x0, y0) = anchors[upper - 1];
    let (x1, y1) = anchors[upper];
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// The colour tables shipped with the plotter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTable {
    /// 256 entries, screen temperature (`myT2_glob`).
    Temperature,
    /// 256 entries, wind speed (`wind2`).
    Wind,
    /// 11 entries, horizontal visibility (`myvisib`).
    Visibility,
    /// 11 entries, hourly rain gauge totals (`overplot_ppncloud` plus white and aqua).
    Precipitation,
}

impl BuiltinTable {
    pub fn channel_count(&self) -> usize {
        match self {
            BuiltinTable::Temperature | BuiltinTable::Wind => 256,
            BuiltinTable::Visibility | BuiltinTable::Precipitation => 11,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            BuiltinTable::Temperature => include_str!("../tables/temperature.clr"),
            BuiltinTable::Wind => include_str!("../tables/wind.clr"),
            BuiltinTable::Visibility => include_str!("../tables/visibility.clr"),
            BuiltinTable::Precipitation => include_str!("../tables/precipitation.clr"),
        }
    }

    pub fn load(&self) -> Result<ColourTable> {
        ColourTable::parse_text(self.source(), self.channel_count())
    }
}

/// Rain-rate gradient: the eight rain colours of the precipitation table,
/// evenly spaced.
pub fn precipitation_gradient() -> GradientSegments {
    const RED: [u8; 8] = [121, 81, 40, 31, 255, 255, 236, 255];
    const GREEN: [u8; 8] = [178, 147, 104, 201, 240, 155, 50, 93];
    const BLUE: [u8; 8] = [233, 212, 189, 27, 58, 0, 27, 251];

    let colours: Vec<Rgb> = (0..8)
        .map(|i| {
            Rgb::new(
                RED[i] as f64 / 255.0,
                GREEN[i] as f64 / 255.0,
                BLUE[i] as f64 / 255.0,
            )
        })
        .collect();
    GradientSegments::evenly_spaced(&colours)
}
