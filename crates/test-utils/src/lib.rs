//! Shared test utilities for the obs-maps workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Approximate float assertions
//! - Raw observation row builders
//! - Grid data generators
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{assert_approx_eq, fixtures};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for approximate equality of two colours with `r`, `g`, `b`, `a` fields.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_colour_approx_eq;
///
/// assert_colour_approx_eq!(map.colour_at(0.5), expected, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_colour_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        $crate::assert_approx_eq!(left.r, right.r, $epsilon);
        $crate::assert_approx_eq!(left.g, right.g, $epsilon);
        $crate::assert_approx_eq!(left.b, right.b, $epsilon);
        $crate::assert_approx_eq!(left.a, right.a, $epsilon);
    }};
}
