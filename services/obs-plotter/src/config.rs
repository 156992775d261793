//! Run configuration for the observation plotter.
//!
//! Loaded from a YAML file (default `config/plotter.yaml`). A missing file
//! falls back to the built-in defaults; a malformed one is a start-up error.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use observations::{TimeOfDay, Variable};
use serde::Deserialize;
use tracing::{debug, warn};

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotterConfig {
    /// Identity sent with every observation request.
    #[serde(default = "default_contact")]
    pub contact: String,
    /// Platform filter for observation requests.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Start time of a date with no maps yet.
    #[serde(default = "default_start")]
    pub default_start: TimeOfDay,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default = "default_variables")]
    pub variables: Vec<VariableOutput>,
}

fn default_contact() -> String {
    "obs-plotter".to_string()
}

fn default_platform() -> String {
    "03".to_string()
}

fn default_start() -> TimeOfDay {
    TimeOfDay::MIDNIGHT
}

fn default_variables() -> Vec<VariableOutput> {
    Variable::ALL
        .iter()
        .map(|&variable| VariableOutput {
            variable,
            output_dir: PathBuf::from("output").join(variable.name()),
            enabled: true,
        })
        .collect()
}

/// Where observation rows come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// JSON extracts named `<SUBTYPE>_<YYYYMMDD>.json`.
    File { dir: PathBuf },
    /// Observation store HTTP endpoint.
    Http {
        url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::File {
            dir: PathBuf::from("data/obs"),
        }
    }
}

/// Output image geometry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default)]
    pub extent: Extent,
}

fn default_width() -> u32 {
    512
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            extent: Extent::default(),
        }
    }
}

/// Map extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Extent {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Default for Extent {
    /// The British Isles.
    fn default() -> Self {
        Self {
            min_lon: -9.8,
            max_lon: 2.6,
            min_lat: 48.59,
            max_lat: 59.5,
        }
    }
}

impl Extent {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// One plotted variable and its output directory.
#[derive(Debug, Clone, Deserialize)]
pub struct VariableOutput {
    pub variable: Variable,
    pub output_dir: PathBuf,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for PlotterConfig {
    fn default() -> Self {
        Self {
            contact: default_contact(),
            platform: default_platform(),
            default_start: default_start(),
            source: SourceConfig::default(),
            image: ImageConfig::default(),
            variables: default_variables(),
        }
    }
}

impl PlotterConfig {
    /// Load a configuration file, or the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: PlotterConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded plotter config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.image.width == 0 {
            bail!("image width must be positive");
        }
        let e = &self.image.extent;
        if !(e.min_lon < e.max_lon && e.min_lat < e.max_lat) {
            bail!("image extent is empty: {:?}", e);
        }
        let mut seen = Vec::new();
        for output in &self.variables {
            if seen.contains(&output.variable) {
                bail!("variable {} is listed more than once", output.variable);
            }
            seen.push(output.variable);
        }
        Ok(())
    }

    /// Enabled variables in configuration order.
    pub fn enabled_variables(&self) -> impl Iterator<Item = &VariableOutput> {
        self.variables.iter().filter(|output| output.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlotterConfig::default();
        assert_eq!(config.default_start, TimeOfDay::MIDNIGHT);
        assert_eq!(config.variables.len(), 4);
        assert_eq!(config.image.width, 512);
        assert_eq!(config.image.extent.min_lon, -9.8);
        assert!(matches!(config.source, SourceConfig::File { .. }));
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
contact: "plotter@example.com"
default_start: "0600"

source:
  type: http
  url: "http://obs.example.com/retrieve"

image:
  width: 800

variables:
  - variable: temperature
    output_dir: /data/maps/temp
  - variable: precipitation
    output_dir: /data/maps/precip
    enabled: false
"#;

        let config: PlotterConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.contact, "plotter@example.com");
        assert_eq!(config.platform, "03");
        assert_eq!(config.default_start.to_string(), "0600");
        assert_eq!(config.image.width, 800);
        assert_eq!(config.image.extent, Extent::default());

        match &config.source {
            SourceConfig::Http { url, timeout_secs } => {
                assert_eq!(url, "http://obs.example.com/retrieve");
                assert_eq!(*timeout_secs, 120);
            }
            other => panic!("unexpected source {:?}", other),
        }

        let enabled: Vec<Variable> = config.enabled_variables().map(|o| o.variable).collect();
        assert_eq!(enabled, vec![Variable::Temperature]);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(serde_yaml::from_str::<PlotterConfig>("default_start: \"2500\"").is_err());
        assert!(serde_yaml::from_str::<PlotterConfig>("variables:\n  - variable: humidity\n    output_dir: x").is_err());

        let config: PlotterConfig = serde_yaml::from_str(
            "variables:\n  - variable: visibility\n    output_dir: a\n  - variable: visibility\n    output_dir: b",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_config_parses() {
        let config: PlotterConfig =
            serde_yaml::from_str(include_str!("../../../config/plotter.yaml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_variables().count(), 4);
        assert_eq!(config.image, ImageConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = PlotterConfig::load(Path::new("/nonexistent/plotter.yaml")).unwrap();
        assert_eq!(config.variables.len(), 4);
    }

    #[test]
    fn test_extent_contains() {
        let extent = Extent::default();
        assert!(extent.contains(51.5, -0.1));
        assert!(!extent.contains(40.0, -0.1));
        assert!(!extent.contains(51.5, 5.0));
    }
}
