//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the resolution engine:
//! - Store handles (`NodeHandle`, `EdgeHandle`, `Upserted`)
//! - Graph labels (`NodeLabel`, `EdgeLabel`)
//! - Property values and result rows (`PropertyValue`, `Properties`, `Row`)
//! - Domain enums (`TransportType`, `Side`) and `Coordinate`
//! - Error types (`KernnetzError`)
//!
//! ## Determinism Guarantees
//!
//! Handles and labels implement `Ord` so that every map in the crate can be a
//! `BTreeMap`/`BTreeSet` and every iteration order is reproducible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A snapshot year. Every Fahrplanbuch edition is identified by its year.
pub type Year = i32;

// =============================================================================
// STORE HANDLES
// =============================================================================

/// Opaque handle to a node inside a `GraphStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

/// Opaque handle to an edge inside a `GraphStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeHandle(pub u64);

/// Result of an upsert-by-key: the handle plus whether it was newly created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted<H> {
    pub handle: H,
    pub created: bool,
}

impl<H> Upserted<H> {
    #[must_use]
    pub const fn created(handle: H) -> Self {
        Self {
            handle,
            created: true,
        }
    }

    #[must_use]
    pub const fn existing(handle: H) -> Self {
        Self {
            handle,
            created: false,
        }
    }
}

// =============================================================================
// LABELS
// =============================================================================

/// Node labels known to the transit graph.
///
/// Each label has exactly one key property; `upsert_node` finds or creates a
/// node by `(label, key)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    /// One observation of a station in one snapshot year.
    Station,
    /// One observation of a line in one snapshot year.
    Line,
    /// A snapshot year in the global catalog.
    Year,
    /// A resolved station spanning many snapshots.
    CoreStation,
    /// A resolved line spanning many snapshots.
    CoreLine,
}

impl NodeLabel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Station => "Station",
            Self::Line => "Line",
            Self::Year => "Year",
            Self::CoreStation => "CoreStation",
            Self::CoreLine => "CoreLine",
        }
    }

    /// Name of the property that holds the node key.
    #[must_use]
    pub const fn key_property(self) -> &'static str {
        match self {
            Self::Station => "stop_id",
            Self::Line => "line_id",
            Self::Year => "year",
            Self::CoreStation => "core_id",
            Self::CoreLine => "core_line_id",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge labels known to the transit graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeLabel {
    /// Snapshot station/line -> Year.
    InYear,
    /// Snapshot line -> snapshot station, carries `stop_order`.
    Serves,
    /// Snapshot station -> next snapshot station on some line.
    ConnectsTo,
    /// Core entity -> constituent snapshot entity.
    HasSnapshot,
    /// Core line -> core station.
    ServesCore,
}

impl EdgeLabel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InYear => "IN_YEAR",
            Self::Serves => "SERVES",
            Self::ConnectsTo => "CONNECTS_TO",
            Self::HasSnapshot => "HAS_SNAPSHOT",
            Self::ServesCore => "SERVES_CORE",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PROPERTY VALUES
// =============================================================================

/// A single property value stored on a node or an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    TextList(Vec<String>),
}

impl PropertyValue {
    /// Numeric view: floats, ints and numeric text all qualify.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer view: ints and integer text qualify.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            Self::TextList(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            Self::IntList(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Named properties of a node or an edge.
pub type Properties = BTreeMap<String, PropertyValue>;

/// One result row of a pattern query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Properties);

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: PropertyValue) {
        self.0.insert(key.to_string(), value);
    }

    /// Raw access. `Null` values are reported as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropertyValue::as_i64)
    }

    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropertyValue::as_f64)
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.0
    }
}

// =============================================================================
// DOMAIN ENUMS
// =============================================================================

/// Mode of transport of a station or line.
///
/// `Autobus` and `Omnibus` are distinct: the sources use both spellings for
/// different operators and resolution groups on exact equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportType {
    UBahn,
    SBahn,
    Tram,
    Autobus,
    Omnibus,
    Ferry,
}

impl TransportType {
    pub const ALL: [Self; 6] = [
        Self::UBahn,
        Self::SBahn,
        Self::Tram,
        Self::Autobus,
        Self::Omnibus,
        Self::Ferry,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UBahn => "u-bahn",
            Self::SBahn => "s-bahn",
            Self::Tram => "tram",
            Self::Autobus => "autobus",
            Self::Omnibus => "omnibus",
            Self::Ferry => "ferry",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = KernnetzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| KernnetzError::InvalidRecord(format!("unknown transport type '{s}'")))
    }
}

/// Administrative side of divided Berlin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    East,
    West,
    /// Pre-division or otherwise unresolved.
    Unified,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::East => "east",
            Self::West => "west",
            Self::Unified => "unified",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = KernnetzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "east" => Ok(Self::East),
            "west" => Ok(Self::West),
            "unified" => Ok(Self::Unified),
            _ => Err(KernnetzError::InvalidRecord(format!("unknown side '{s}'"))),
        }
    }
}

/// WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Arithmetic mean of a set of positions. `None` for an empty slice.
    #[must_use]
    pub fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let lat = points.iter().map(|p| p.latitude).sum::<f64>() / n;
        let lon = points.iter().map(|p| p.longitude).sum::<f64>() / n;
        Some(Self::new(lat, lon))
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the resolution engine.
///
/// - No silent failures
/// - Use `Result<T, KernnetzError>` for fallible operations
/// - Data-quality gaps are NOT errors; they surface in load reports
#[derive(Debug, Error)]
pub enum KernnetzError {
    /// A record or dataset entry failed validation.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The requested node was not found in the store.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeHandle),

    /// The requested edge was not found in the store.
    #[error("Edge not found: {0:?}")]
    EdgeNotFound(EdgeHandle),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// =============================================================================
// TESTS
// =============================================================================
