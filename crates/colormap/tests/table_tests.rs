//! Tests for colour table parsing.

use colormap::table::precipitation_gradient;
use colormap::{BuiltinTable, ColourMapError, ColourTable, GradientSegments, Rgb};
use test_utils::assert_approx_eq;

// ============================================================================
// Channel-major parsing
// ============================================================================

#[test]
fn test_parse_transposes_channel_blocks() {
    // R block, G block, B block for two entries.
    let raw = [255, 0, 0, 255, 51, 102];
    let table = ColourTable::parse(&raw, 2).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0), Some(Rgb::new(1.0, 0.0, 0.2)));
    assert_eq!(table.get(1), Some(Rgb::new(0.0, 1.0, 0.4)));
    assert_eq!(table.get(2), None);
}

#[test]
fn test_parse_round_trip_reproduces_input() {
    let raw: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).chain((0..=255u8).step_by(1)).collect();
    let table = ColourTable::parse(&raw, 256).unwrap();

    assert_eq!(table.len(), 256);
    for colour in table.colours() {
        for channel in [colour.r, colour.g, colour.b] {
            assert!((0.0..=1.0).contains(&channel));
        }
    }
    assert_eq!(table.to_channel_major_bytes(), raw);
}

#[test]
fn test_parse_builtin_round_trips() {
    for builtin in [
        BuiltinTable::Temperature,
        BuiltinTable::Wind,
        BuiltinTable::Visibility,
        BuiltinTable::Precipitation,
    ] {
        let table = builtin.load().unwrap();
        assert_eq!(table.len(), builtin.channel_count());

        let expected: Vec<u8> = builtin
            .source()
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(table.to_channel_major_bytes(), expected);
    }
}

// ============================================================================
// Malformed input
// ============================================================================

#[test]
fn test_parse_rejects_length_not_multiple_of_three() {
    let err = ColourTable::parse(&[1, 2, 3, 4], 1).unwrap_err();
    assert!(matches!(err, ColourMapError::MalformedColourTable(_)));
}

#[test]
fn test_parse_rejects_channel_count_mismatch() {
    let err = ColourTable::parse(&[0; 9], 2).unwrap_err();
    assert!(matches!(err, ColourMapError::MalformedColourTable(_)));
    assert!(ColourTable::parse(&[], 0).is_err());
}

#[test]
fn test_parse_text_rejects_out_of_range_tokens() {
    assert!(ColourTable::parse_text("0 0 256", 1).is_err());
    assert!(ColourTable::parse_text("0 0 -1", 1).is_err());
    assert!(ColourTable::parse_text("0 0 x", 1).is_err());
    assert!(ColourTable::parse_text("0\n0\t255", 1).is_ok());
}

// ============================================================================
// Gradient sampling
// ============================================================================

#[test]
fn test_gradient_endpoints() {
    let gradient = GradientSegments::evenly_spaced(&[
        Rgb::new(0.0, 0.0, 0.0),
        Rgb::new(1.0, 0.5, 0.0),
    ]);
    let table = ColourTable::from_gradient(&gradient, 3).unwrap();

    assert_eq!(table.get(0), Some(Rgb::new(0.0, 0.0, 0.0)));
    let mid = table.get(1).unwrap();
    assert_approx_eq!(mid.r, 0.5, 1e-12);
    assert_approx_eq!(mid.g, 0.25, 1e-12);
    assert_eq!(table.get(2), Some(Rgb::new(1.0, 0.5, 0.0)));
}

#[test]
fn test_precipitation_gradient_samples() {
    let table = ColourTable::from_gradient(&precipitation_gradient(), 256).unwrap();
    assert_eq!(table.len(), 256);

    let first = table.get(0).unwrap();
    assert_approx_eq!(first.r, 121.0 / 255.0, 1e-9);
    let last = table.get(255).unwrap();
    assert_approx_eq!(last.b, 251.0 / 255.0, 1e-9);
}

#[test]
fn test_gradient_needs_two_samples() {
    assert!(ColourTable::from_gradient(&precipitation_gradient(), 1).is_err());
}
