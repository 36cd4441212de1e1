//! # Resolution Primitives
//!
//! Hardcoded constants of the resolution engine.
//!
//! These values are compiled into the binary. Runtime configuration may
//! override the dividing longitude and the confidence threshold, but the
//! scoring ladder itself is fixed.

/// Approximate longitude of the north-south course of the Berlin Wall.
///
/// A unified line whose served stations average strictly east of this value
/// is assigned to the east side; ties go west.
pub const BERLIN_DIVIDING_LONGITUDE: f64 = 13.4;

/// Flat-earth conversion factor: metres per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Distance ladder for station confidence, as `(max_distance_m, confidence)`.
///
/// The first rung whose distance bound is not exceeded wins.
pub const STATION_CONFIDENCE_LADDER: [(f64, f64); 3] = [(200.0, 0.95), (250.0, 0.8), (300.0, 0.6)];

/// Confidence for station groups spread wider than the last ladder rung.
pub const STATION_CONFIDENCE_FLOOR: f64 = 0.3;

/// Confidence for a candidate backed by exactly one snapshot record.
pub const SINGLE_MEMBER_CONFIDENCE: f64 = 1.0;

/// Confidence for a line candidate backed by more than one snapshot line.
pub const MULTI_MEMBER_LINE_CONFIDENCE: f64 = 0.9;

/// Default `--min-confidence` applied before persisting candidates.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.9;

/// Gap reason assigned to unobserved years by default.
pub const DATA_GAP_REASON: &str = "data_gap";

/// Provenance tag written to every core entity created by this engine.
pub const CORE_SOURCE_TAG: &str = "core_entity_resolver";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a snapshot identifier.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Maximum length of a station or line name.
pub const MAX_NAME_LENGTH: usize = 256;

/// Earliest accepted snapshot year.
pub const MIN_SNAPSHOT_YEAR: i32 = 1800;

/// Latest accepted snapshot year.
pub const MAX_SNAPSHOT_YEAR: i32 = 2100;
