//! Forecast field maps.
//!
//! Grids for one model run arrive pre-parsed as JSON files named
//! `<YYYYMMDD><RR>00_<Tag>_<HH>.json`, where `HH` is the forecast hour. Each
//! holds `{"width", "height", "values"}` in row-major order with row 0 at the
//! top of the map and `null` for missing cells. One image
//! `<Product>_<HH>.png` is written per forecast hour.

use std::path::{Path, PathBuf};

use colormap::{
    colour_grid, combine_rain_rates, overlay, CloudLayer, ColourMapError, FieldStyle,
    ForecastField,
};
use image::RgbaImage;
use metrics::counter;
use observations::ProcessingDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::output::{write_png, RenderError};

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed grid {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("grid shape mismatch: expected {expected_width}x{expected_height}, got {width}x{height} with {values} values")]
    Shape {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
        values: usize,
    },

    #[error("invalid model run '{0}', expected an hour 00-23")]
    InvalidRun(String),

    #[error(transparent)]
    Colour(#[from] ColourMapError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Kind of forecast map, each drawn from one or more input grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ForecastProduct {
    /// Dynamic plus convective rain rate.
    RainRate,
    /// 1.5 m air temperature.
    #[value(name = "temperature-1p5m")]
    Temperature1p5m,
    /// Low, mid and high cloud fraction overlaid.
    Cloud,
}

impl ForecastProduct {
    /// Name used for the output images.
    pub fn name(&self) -> &'static str {
        match self {
            ForecastProduct::RainRate => "Rain_Rate",
            ForecastProduct::Temperature1p5m => "Temperature_1p5m",
            ForecastProduct::Cloud => "Cloud",
        }
    }

    /// Grid file tags, the first one deciding which hours exist.
    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            ForecastProduct::RainRate => &["Dynamic_Rain_Rate", "Convective_Rain_Rate"],
            ForecastProduct::Temperature1p5m => &["Temperature_1p5m"],
            ForecastProduct::Cloud => &["Low_Cloud", "Med_Cloud", "High_Cloud"],
        }
    }

    /// Fields coloured for this product, bottom layer first.
    pub fn fields(&self) -> Vec<ForecastField> {
        match self {
            ForecastProduct::RainRate => vec![ForecastField::RainRate],
            ForecastProduct::Temperature1p5m => vec![ForecastField::Temperature1p5m],
            ForecastProduct::Cloud => CloudLayer::ALL.iter().map(|&l| ForecastField::Cloud(l)).collect(),
        }
    }
}

/// One decoded forecast grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub values: Vec<Option<f32>>,
}

impl Grid {
    /// Values with missing cells as NaN, after checking the shape.
    fn into_values(self, width: usize, height: usize) -> Result<Vec<f32>, FieldError> {
        if self.width != width
            || self.height != height
            || self.values.len() != width * height
            || width * height == 0
        {
            return Err(FieldError::Shape {
                expected_width: width,
                expected_height: height,
                width: self.width,
                height: self.height,
                values: self.values.len(),
            });
        }
        Ok(self
            .values
            .into_iter()
            .map(|v| v.unwrap_or(f32::NAN))
            .collect())
    }
}

/// Read one grid file.
pub async fn load_grid(path: &Path) -> Result<Grid, FieldError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FieldError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&content).map_err(|source| FieldError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Colours the grids of one product into an image.
pub struct FieldRenderer {
    product: ForecastProduct,
    styles: Vec<FieldStyle>,
}

impl FieldRenderer {
    pub fn new(product: ForecastProduct) -> Result<Self, FieldError> {
        let styles = product
            .fields()
            .into_iter()
            .map(FieldStyle::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { product, styles })
    }

    /// Draw the grids, given in [`ForecastProduct::inputs`] order and in
    /// source units. All grids must share the shape of the first.
    pub fn draw(&self, grids: Vec<Grid>) -> Result<RgbaImage, FieldError> {
        let (width, height) = match grids.first() {
            Some(first) => (first.width, first.height),
            None => {
                return Err(FieldError::Shape {
                    expected_width: 0,
                    expected_height: 0,
                    width: 0,
                    height: 0,
                    values: 0,
                })
            }
        };
        let mut values = grids
            .into_iter()
            .map(|grid| grid.into_values(width, height))
            .collect::<Result<Vec<_>, _>>()?;

        let pixels = match self.product {
            ForecastProduct::RainRate => {
                let convective = values.pop().unwrap_or_default();
                let dynamic = values.pop().unwrap_or_default();
                let rates = combine_rain_rates(&dynamic, &convective)?;
                colour_grid(&rates, width, height, &self.styles[0])?
            }
            ForecastProduct::Temperature1p5m => {
                let mut data = values.pop().unwrap_or_default();
                ForecastField::Temperature1p5m.convert_grid(&mut data);
                colour_grid(&data, width, height, &self.styles[0])?
            }
            ForecastProduct::Cloud => {
                let mut composite = vec![0u8; width * height * 4];
                for (data, style) in values.iter().zip(&self.styles) {
                    let layer = colour_grid(data, width, height, style)?;
                    overlay(&mut composite, &layer)?;
                }
                composite
            }
        };

        RgbaImage::from_raw(width as u32, height as u32, pixels).ok_or(FieldError::Shape {
            expected_width: width,
            expected_height: height,
            width,
            height,
            values: width * height,
        })
    }
}

/// Forecast maps for one product of one model run.
#[derive(Debug, Clone)]
pub struct FieldRun {
    pub data_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub product: ForecastProduct,
    pub date: ProcessingDate,
    run: String,
}

impl FieldRun {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        plot_dir: impl Into<PathBuf>,
        product: ForecastProduct,
        date: ProcessingDate,
        model_run: &str,
    ) -> Result<Self, FieldError> {
        let hour = match model_run.parse::<u8>() {
            Ok(hour) if hour <= 23 && model_run.len() <= 2 => hour,
            _ => return Err(FieldError::InvalidRun(model_run.to_string())),
        };
        Ok(Self {
            data_dir: data_dir.into(),
            plot_dir: plot_dir.into(),
            product,
            date,
            run: format!("{:02}", hour),
        })
    }

    /// Model run hour, zero padded.
    pub fn run(&self) -> &str {
        &self.run
    }

    fn prefix(&self) -> String {
        format!("{}{}00", self.date, self.run)
    }

    pub fn grid_path(&self, tag: &str, hour: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}_{}.json", self.prefix(), tag, hour))
    }

    pub fn plot_path(&self, hour: &str) -> PathBuf {
        self.plot_dir
            .join(format!("{}_{}.png", self.product.name(), hour))
    }

    /// Forecast hours present for the product's first input, sorted.
    pub fn forecast_hours(&self) -> Result<Vec<String>, FieldError> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }
        let head = format!("{}_{}_", self.prefix(), self.product.inputs()[0]);

        let mut hours = Vec::new();
        for entry in WalkDir::new(&self.data_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| FieldError::Io {
                path: self.data_dir.clone(),
                source: e.into(),
            })?;
            let name = entry.file_name().to_string_lossy();
            let hour = name
                .strip_prefix(head.as_str())
                .and_then(|rest| rest.strip_suffix(".json"));
            if let Some(hour) = hour {
                if hour.len() == 2 && hour.bytes().all(|b| b.is_ascii_digit()) {
                    hours.push(hour.to_string());
                }
            }
        }
        hours.sort();
        Ok(hours)
    }
}

/// How a field run went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldReport {
    pub rendered: usize,
    pub failed: usize,
}

/// Render every forecast hour of `run`. A failing hour is logged and the
/// rest still render.
#[instrument(skip_all, fields(product = run.product.name(), date = %run.date, run = run.run()))]
pub async fn render_fields(run: &FieldRun, renderer: &FieldRenderer) -> Result<FieldReport, FieldError> {
    let hours = run.forecast_hours()?;
    if hours.is_empty() {
        warn!(dir = %run.data_dir.display(), "No forecast grids found");
        return Ok(FieldReport::default());
    }

    let mut report = FieldReport::default();
    for hour in &hours {
        match render_hour(run, renderer, hour).await {
            Ok(path) => {
                report.rendered += 1;
                counter!("forecast_maps_rendered_total", "product" => run.product.name())
                    .increment(1);
                debug!(hour = %hour, path = %path.display(), "Rendered forecast map");
            }
            Err(e) => {
                report.failed += 1;
                warn!(hour = %hour, error = %e, "Forecast map failed");
            }
        }
    }

    info!(rendered = report.rendered, failed = report.failed, "Forecast maps complete");
    Ok(report)
}

async fn render_hour(
    run: &FieldRun,
    renderer: &FieldRenderer,
    hour: &str,
) -> Result<PathBuf, FieldError> {
    let mut grids = Vec::with_capacity(run.product.inputs().len());
    for tag in run.product.inputs() {
        grids.push(load_grid(&run.grid_path(tag, hour)).await?);
    }

    let image = renderer.draw(grids)?;
    let path = run.plot_path(hour);
    write_png(&image, &path)?;
    info!(
        title = %format!("{} Run {}Z Forecast {}", run.date, run.run(), hour),
        path = %path.display(),
        "Wrote forecast map"
    );
    Ok(path)
}
