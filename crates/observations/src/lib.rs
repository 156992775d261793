//! Station observation processing for hourly observation maps.
//!
//! Provides:
//! - Decoding of raw observation store rows into [`ObservationRecord`]s
//! - Per-variable plot configuration ([`PlotConfig`]) and unit conversion
//! - Binning of records into per-timestamp buckets
//! - Resume points computed from already rendered maps
//!
//! # Example
//!
//! ```
//! use observations::{bin_variable, ObservationRecord, Quantity, Variable};
//!
//! let record = ObservationRecord::new(1, Some(51.5), Some(-0.1), (2024, 6, 1, 12, 0))
//!     .with_quantity(Quantity::AirTemperature, Some(283.15));
//! let buckets = bin_variable(&[record], Variable::Temperature);
//! assert_eq!(buckets.len(), 1);
//! ```

pub mod binner;
pub mod error;
pub mod record;
pub mod resume;
pub mod time;
pub mod variable;

pub use binner::{bin, bin_variable, retained_count, StationValue, TimestampBuckets};
pub use error::{ObservationError, Result};
pub use record::{decode_rows, ObservationRecord, ObservationSourceKind, Quantity, RawRecord};
pub use resume::{ResumeTracker, StartBoundary};
pub use time::{ProcessingDate, TimeOfDay, TimestampKey};
pub use variable::{
    Extend, Legend, PlotConfig, RangePolicy, Variable, KELVIN_OFFSET, MS_TO_KNOTS,
};
