//! Error types for the observations crate.

use colormap::ColourMapError;
use thiserror::Error;

/// Errors that can occur while decoding, binning or configuring observations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObservationError {
    #[error("Invalid timestamp key: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid processing date: {0}")]
    InvalidDate(String),

    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    #[error("Undecodable record: {0}")]
    UndecodableRecord(String),

    #[error("Invalid plot configuration: {0}")]
    ColourMap(#[from] ColourMapError),
}

/// Result type for observation operations.
pub type Result<T> = std::result::Result<T, ObservationError>;
