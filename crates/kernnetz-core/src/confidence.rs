//! # Confidence Module
//!
//! Confidence scoring for entity resolution.
//!
//! - Stations: the wider the spread of a group's observed positions, the
//!   lower the confidence that they denote one physical station
//! - Lines: a flat score based only on member count
//! - Scores are downstream filters; nothing here rejects a group

use crate::Coordinate;
use crate::primitives::{
    METERS_PER_DEGREE, MULTI_MEMBER_LINE_CONFIDENCE, SINGLE_MEMBER_CONFIDENCE,
    STATION_CONFIDENCE_FLOOR, STATION_CONFIDENCE_LADDER,
};

/// Flat-earth Manhattan distance in metres between two positions.
///
/// The longitude term is scaled by the cosine of the pair's mean latitude.
#[must_use]
pub fn manhattan_distance_m(a: Coordinate, b: Coordinate) -> f64 {
    let mean_lat = (a.latitude + b.latitude) / 2.0;
    let lat_m = (b.latitude - a.latitude).abs() * METERS_PER_DEGREE;
    let lon_m = (b.longitude - a.longitude).abs() * METERS_PER_DEGREE * mean_lat.to_radians().cos().abs();
    lat_m + lon_m
}

/// Largest pairwise distance among the positions, 0 for fewer than two.
#[must_use]
pub fn max_pairwise_distance_m(points: &[Coordinate]) -> f64 {
    let mut max = 0.0_f64;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            max = max.max(manhattan_distance_m(*a, *b));
        }
    }
    max
}

/// Map a maximum spread in metres onto the confidence ladder.
#[must_use]
pub fn confidence_for_spread(max_distance_m: f64) -> f64 {
    STATION_CONFIDENCE_LADDER
        .iter()
        .find(|(bound, _)| max_distance_m <= *bound)
        .map_or(STATION_CONFIDENCE_FLOOR, |(_, confidence)| *confidence)
}

/// Confidence that a group of station observations is one station.
///
/// A lone observation is fully confident.
#[must_use]
pub fn station_confidence(points: &[Coordinate]) -> f64 {
    if points.len() <= 1 {
        return SINGLE_MEMBER_CONFIDENCE;
    }
    confidence_for_spread(max_pairwise_distance_m(points))
}

/// Confidence that a group of snapshot lines is one line.
#[must_use]
pub fn line_confidence(member_count: usize) -> f64 {
    if member_count > 1 {
        MULTI_MEMBER_LINE_CONFIDENCE
    } else {
        SINGLE_MEMBER_CONFIDENCE
    }
}
