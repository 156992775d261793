//! Error types for colour table and colour map construction.

use thiserror::Error;

/// Result type alias using ColourMapError.
pub type Result<T> = std::result::Result<T, ColourMapError>;

/// Errors raised while building or evaluating colour maps.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColourMapError {
    #[error("Malformed colour table: {0}")]
    MalformedColourTable(String),

    #[error("Degenerate value range: min and max are both {0}")]
    DegenerateRange(f64),

    #[error("Value {value} outside bounds [{lower}, {upper})")]
    ValueOutOfRange { value: f64, lower: f64, upper: f64 },

    #[error("Invalid colour levels: {0}")]
    InvalidLevels(String),

    #[error("Invalid bin bounds: {0}")]
    InvalidBounds(String),

    #[error("Grid size mismatch: expected {expected} values, got {actual}")]
    GridMismatch { expected: usize, actual: usize },
}
