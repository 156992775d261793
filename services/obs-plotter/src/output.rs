//! Rendered map artifacts.
//!
//! Maps are written as `<dir>/<YYYYMMDDHHMM>.png`. The same names are read
//! back to work out where an interrupted date should resume.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use colormap::Rgba as Colour;
use image::{ImageFormat, Rgba, RgbaImage};
use observations::{
    ObservationError, PlotConfig, RangePolicy, StationValue, TimestampKey,
};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ImageConfig;

/// Height of the legend bar under the map.
const LEGEND_HEIGHT: u32 = 16;
/// Half-width of a station marker.
const MARKER_RADIUS: i64 = 2;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TICK: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("colour lookup failed: {0}")]
    Colour(#[from] ObservationError),
}

/// Timestamps already rendered in `dir` for `date_prefix`.
///
/// A missing directory has no maps. Files whose stem is not a valid
/// timestamp key are ignored.
pub fn list_existing(dir: &Path, date_prefix: &str) -> std::io::Result<BTreeSet<TimestampKey>> {
    if !dir.exists() {
        return Ok(BTreeSet::new());
    }

    let mut keys = BTreeSet::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let stem = entry.path().file_stem().and_then(|s| s.to_str());
        if let Some(key) = stem.and_then(|s| TimestampKey::parse(s).ok()) {
            if key.date_prefix() == date_prefix {
                keys.insert(key);
            }
        }
    }

    debug!(dir = %dir.display(), date = date_prefix, count = keys.len(), "Scanned existing maps");
    Ok(keys)
}

/// Write `image` as a PNG at `path`, creating the parent directory.
///
/// The image is encoded under a hidden `.partial` name and renamed, so only
/// a complete file ever carries the final name.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<(), RenderError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|source| RenderError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{}.partial", name));
    image.save_with_format(&temp_path, ImageFormat::Png)?;
    std::fs::rename(&temp_path, path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Final path of the map for `key`.
pub fn artifact_path(dir: &Path, key: &TimestampKey) -> PathBuf {
    dir.join(format!("{}.png", key))
}

/// Draws one map per (timestamp, variable).
pub trait MapRenderer: Send + Sync {
    fn render(
        &self,
        key: &TimestampKey,
        points: &[StationValue],
        plot: &PlotConfig,
        output_dir: &Path,
    ) -> Result<PathBuf, RenderError>;
}

/// Station markers on an equirectangular map with a legend bar.
pub struct PointMapRenderer {
    config: ImageConfig,
    map_height: u32,
}

impl PointMapRenderer {
    pub fn new(config: ImageConfig) -> Self {
        let e = config.extent;
        let aspect = (e.max_lat - e.min_lat) / (e.max_lon - e.min_lon);
        let map_height = ((config.width as f64 * aspect).round() as u32).max(1);
        Self { config, map_height }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.map_height + LEGEND_HEIGHT)
    }

    /// Pixel position of a point, `None` outside the extent.
    fn project(&self, lat: f64, lon: f64) -> Option<(i64, i64)> {
        let e = &self.config.extent;
        if !e.contains(lat, lon) {
            return None;
        }
        let x = (lon - e.min_lon) / (e.max_lon - e.min_lon) * (self.config.width - 1) as f64;
        let y = (e.max_lat - lat) / (e.max_lat - e.min_lat) * (self.map_height - 1) as f64;
        Some((x.round() as i64, y.round() as i64))
    }

    pub fn draw(&self, points: &[StationValue], plot: &PlotConfig) -> Result<RgbaImage, RenderError> {
        let (width, height) = self.dimensions();
        let mut image = RgbaImage::from_pixel(width, height, BACKGROUND);

        for point in points {
            let Some((cx, cy)) = self.project(point.latitude, point.longitude) else {
                continue;
            };
            let colour = pixel(plot.colour_for(point.value)?);
            for y in (cy - MARKER_RADIUS)..=(cy + MARKER_RADIUS) {
                for x in (cx - MARKER_RADIUS)..=(cx + MARKER_RADIUS) {
                    if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < self.map_height {
                        image.put_pixel(x as u32, y as u32, colour);
                    }
                }
            }
        }

        self.draw_legend(&mut image, plot)?;
        Ok(image)
    }

    fn draw_legend(&self, image: &mut RgbaImage, plot: &PlotConfig) -> Result<(), RenderError> {
        let width = self.config.width;
        let top = self.map_height;
        let last = (width - 1).max(1) as f64;

        for x in 0..width {
            let t = x as f64 / last;
            let colour = pixel(legend_colour(plot, t)?);
            for y in top..top + LEGEND_HEIGHT {
                image.put_pixel(x, y, colour);
            }
        }

        let legend = plot.legend();
        for &tick in &legend.ticks {
            let t = match plot.range() {
                RangePolicy::Continuous { .. } => plot.legend_position(tick)?,
                RangePolicy::Bounded { .. } => tick,
            };
            let x = ((t * last).round() as u32).min(width - 1);
            for y in top..top + LEGEND_HEIGHT / 4 {
                image.put_pixel(x, y, TICK);
            }
        }
        Ok(())
    }
}

/// Colour at legend position `t`, matching what a value there would get.
fn legend_colour(plot: &PlotConfig, t: f64) -> Result<Colour, RenderError> {
    let colour = match plot.range() {
        RangePolicy::Continuous { min, max } => plot.colour_for(min + t * (max - min))?,
        RangePolicy::Bounded { bounds } => {
            let bins = bounds.len() - 1;
            let bin = ((t * bins as f64).floor() as usize).min(bins - 1);
            plot.colour_for(bounds[bin])?
        }
    };
    Ok(colour)
}

fn pixel(colour: Colour) -> Rgba<u8> {
    Rgba(colour.to_bytes())
}

impl MapRenderer for PointMapRenderer {
    fn render(
        &self,
        key: &TimestampKey,
        points: &[StationValue],
        plot: &PlotConfig,
        output_dir: &Path,
    ) -> Result<PathBuf, RenderError> {
        let image = self.draw(points, plot)?;
        let final_path = artifact_path(output_dir, key);
        write_png(&image, &final_path)?;

        debug!(
            variable = %plot.variable(),
            key = %key,
            stations = points.len(),
            path = %final_path.display(),
            "Rendered map"
        );
        Ok(final_path)
    }
}
