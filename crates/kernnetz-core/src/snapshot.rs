//! # Snapshot Records
//!
//! Typed views of the per-year snapshot data the resolver reads, and the
//! loaders that decode store rows into them.
//!
//! Decoding is best-effort: a row that cannot be decoded is recorded as a
//! `Skipped` outcome with its reason and the load continues. Nothing here
//! aborts on one bad record; store failures still propagate.

use crate::graph::GraphStore;
use crate::query::Pattern;
use crate::{Coordinate, KernnetzError, Row, Side, TransportType, Year};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One observation of a station in one snapshot year.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotStation {
    pub stop_id: String,
    pub name: String,
    pub transport_type: TransportType,
    pub side: Side,
    pub year: Year,
    /// `None` when latitude or longitude is unset or zero.
    pub coordinate: Option<Coordinate>,
    pub source: Option<String>,
}

/// One observation of a line in one snapshot year.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotLine {
    pub line_id: String,
    pub name: String,
    pub transport_type: TransportType,
    pub side: Side,
    pub year: Year,
}

/// A `SERVES` fact whose line and station share `year`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeFact {
    pub line_id: String,
    pub stop_id: String,
    pub year: Year,
    pub stop_order: Option<i64>,
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Why a record was left out of resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A required property is absent or null.
    MissingField { field: &'static str },
    /// A property is present but cannot be interpreted.
    InvalidValue { field: &'static str, value: String },
    /// The station has no usable coordinates.
    MissingCoordinates,
    /// A unified line has no served station with a longitude.
    NoStationGeometry,
    /// A candidate failed to persist under the skip policy.
    PersistFailed { error: String },
}

impl SkipReason {
    /// Short stable tag, used for counting.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::InvalidValue { .. } => "invalid_value",
            Self::MissingCoordinates => "missing_coordinates",
            Self::NoStationGeometry => "no_station_geometry",
            Self::PersistFailed { .. } => "persist_failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing field '{field}'"),
            Self::InvalidValue { field, value } => {
                write!(f, "invalid value '{value}' for '{field}'")
            }
            Self::MissingCoordinates => f.write_str("no coordinates"),
            Self::NoStationGeometry => f.write_str("no station geometry"),
            Self::PersistFailed { error } => write!(f, "persist failed: {error}"),
        }
    }
}

/// A record that was skipped, with the identifier it carried (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub id: String,
    pub reason: SkipReason,
}

/// Result of loading a batch of records: what decoded, and what did not.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub skipped: Vec<Skipped>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Loaded<T> {
    /// Number of skipped records with the given reason tag.
    #[must_use]
    pub fn skip_count(&self, tag: &str) -> usize {
        self.skipped.iter().filter(|s| s.reason.tag() == tag).count()
    }

    /// Skip counts per reason tag.
    #[must_use]
    pub fn skip_summary(&self) -> BTreeMap<&'static str, usize> {
        let mut summary = BTreeMap::new();
        for skipped in &self.skipped {
            *summary.entry(skipped.reason.tag()).or_insert(0) += 1;
        }
        summary
    }
}

// =============================================================================
// FIELD DECODING
// =============================================================================

fn text_field(row: &Row, field: &'static str) -> Result<String, SkipReason> {
    row.get(field)
        .ok_or(SkipReason::MissingField { field })?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SkipReason::InvalidValue {
            field,
            value: format!("{:?}", row.get(field)),
        })
}

fn year_field(row: &Row) -> Result<Year, SkipReason> {
    let raw = row
        .get_i64("year")
        .ok_or(SkipReason::MissingField { field: "year" })?;
    Year::try_from(raw).map_err(|_| SkipReason::InvalidValue {
        field: "year",
        value: raw.to_string(),
    })
}

fn parse_field<T: std::str::FromStr>(row: &Row, field: &'static str) -> Result<T, SkipReason> {
    let raw = text_field(row, field)?;
    raw.parse().map_err(|_| SkipReason::InvalidValue { field, value: raw })
}

/// Zero counts as unset: upstream geocoding writes 0 for "not found".
fn coordinate_of(row: &Row) -> Option<Coordinate> {
    let lat = row.get_f64("latitude").filter(|v| *v != 0.0)?;
    let lon = row.get_f64("longitude").filter(|v| *v != 0.0)?;
    Some(Coordinate::new(lat, lon))
}

fn row_id(row: &Row, key: &str) -> String {
    row.get_str(key).unwrap_or("<unknown>").to_string()
}

/// Decode one station row.
pub fn decode_station(row: &Row) -> Result<SnapshotStation, SkipReason> {
    Ok(SnapshotStation {
        stop_id: text_field(row, "stop_id")?,
        name: text_field(row, "name")?,
        transport_type: parse_field(row, "type")?,
        side: parse_field(row, "east_west")?,
        year: year_field(row)?,
        coordinate: coordinate_of(row),
        source: row.get_str("source").map(str::to_string),
    })
}

/// Decode one line row.
pub fn decode_line(row: &Row) -> Result<SnapshotLine, SkipReason> {
    Ok(SnapshotLine {
        line_id: text_field(row, "line_id")?,
        name: text_field(row, "name")?,
        transport_type: parse_field(row, "type")?,
        side: parse_field(row, "east_west")?,
        year: year_field(row)?,
    })
}

fn decode_serve_fact(row: &Row) -> Result<ServeFact, SkipReason> {
    Ok(ServeFact {
        line_id: text_field(row, "line_id")?,
        stop_id: text_field(row, "stop_id")?,
        year: year_field(row)?,
        stop_order: row.get_i64("stop_order"),
    })
}

// =============================================================================
// LOADERS
// =============================================================================

/// Sorted list of every snapshot year known to the store.
pub fn load_year_catalog<G: GraphStore + ?Sized>(store: &G) -> Result<Vec<Year>, KernnetzError> {
    let years: BTreeSet<Year> = store
        .query(&Pattern::YearCatalog)?
        .iter()
        .filter_map(|row| row.get_i64("year"))
        .filter_map(|year| Year::try_from(year).ok())
        .collect();
    Ok(years.into_iter().collect())
}

/// Load every snapshot station observation.
///
/// Stations without coordinates are excluded and reported as
/// `MissingCoordinates`.
pub fn load_stations<G: GraphStore + ?Sized>(
    store: &G,
) -> Result<Loaded<SnapshotStation>, KernnetzError> {
    let mut loaded = Loaded::default();
    for row in store.query(&Pattern::SnapshotStations)? {
        match decode_station(&row) {
            Ok(station) if station.coordinate.is_some() => loaded.records.push(station),
            Ok(station) => {
                tracing::debug!(stop_id = %station.stop_id, "station has no coordinates");
                loaded.skipped.push(Skipped {
                    id: station.stop_id,
                    reason: SkipReason::MissingCoordinates,
                });
            }
            Err(reason) => {
                let id = row_id(&row, "stop_id");
                tracing::warn!(stop_id = %id, %reason, "skipping station record");
                loaded.skipped.push(Skipped { id, reason });
            }
        }
    }
    Ok(loaded)
}

/// Load every snapshot line observation.
pub fn load_lines<G: GraphStore + ?Sized>(
    store: &G,
) -> Result<Loaded<SnapshotLine>, KernnetzError> {
    let mut loaded = Loaded::default();
    for row in store.query(&Pattern::SnapshotLines)? {
        match decode_line(&row) {
            Ok(line) => loaded.records.push(line),
            Err(reason) => {
                let id = row_id(&row, "line_id");
                tracing::warn!(line_id = %id, %reason, "skipping line record");
                loaded.skipped.push(Skipped { id, reason });
            }
        }
    }
    Ok(loaded)
}

/// Load the undirected station adjacency relation as a neighbour map.
pub fn load_adjacency<G: GraphStore + ?Sized>(
    store: &G,
) -> Result<BTreeMap<String, BTreeSet<String>>, KernnetzError> {
    let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in store.query(&Pattern::StationAdjacency)? {
        let (Some(a), Some(b)) = (row.get_str("from"), row.get_str("to")) else {
            continue;
        };
        adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
    }
    tracing::info!(stations = adjacency.len(), "loaded stations with connections");
    Ok(adjacency)
}

/// Load every same-year `SERVES` fact.
pub fn load_serve_facts<G: GraphStore + ?Sized>(
    store: &G,
) -> Result<Loaded<ServeFact>, KernnetzError> {
    let mut loaded = Loaded::default();
    for row in store.query(&Pattern::ServesInSameYear)? {
        match decode_serve_fact(&row) {
            Ok(fact) => loaded.records.push(fact),
            Err(reason) => loaded.skipped.push(Skipped {
                id: row_id(&row, "line_id"),
                reason,
            }),
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropertyValue;

    fn station_row() -> Row {
        Row::new()
            .with("stop_id", "s1")
            .with("name", "Alexanderplatz")
            .with("type", "u-bahn")
            .with("east_west", "east")
            .with("year", 1965_i64)
            .with("latitude", 52.521)
            .with("longitude", 13.411)
    }

    #[test]
    fn decodes_complete_station() {
        let station = decode_station(&station_row()).expect("decode");
        assert_eq!(station.transport_type, TransportType::UBahn);
        assert_eq!(station.side, Side::East);
        assert_eq!(station.year, 1965);
        assert_eq!(station.coordinate, Some(Coordinate::new(52.521, 13.411)));
    }

    #[test]
    fn zero_or_null_coordinates_are_unset() {
        let zero = station_row().with("latitude", 0.0);
        assert!(decode_station(&zero).expect("decode").coordinate.is_none());

        let null = station_row().with("longitude", PropertyValue::Null);
        assert!(decode_station(&null).expect("decode").coordinate.is_none());
    }

    #[test]
    fn missing_name_is_reported() {
        let mut row = station_row();
        row.0.remove("name");
        assert_eq!(
            decode_station(&row),
            Err(SkipReason::MissingField { field: "name" })
        );
    }

    #[test]
    fn unknown_side_is_invalid() {
        let row = station_row().with("east_west", "north");
        assert!(matches!(
            decode_station(&row),
            Err(SkipReason::InvalidValue {
                field: "east_west",
                ..
            })
        ));
    }

    #[test]
    fn skip_summary_counts_by_tag() {
        let mut loaded: Loaded<SnapshotStation> = Loaded::default();
        for id in ["a", "b"] {
            loaded.skipped.push(Skipped {
                id: id.to_string(),
                reason: SkipReason::MissingCoordinates,
            });
        }
        loaded.skipped.push(Skipped {
            id: "c".to_string(),
            reason: SkipReason::MissingField { field: "name" },
        });
        assert_eq!(loaded.skip_count("missing_coordinates"), 2);
        assert_eq!(loaded.skip_summary().get("missing_field"), Some(&1));
    }
}
