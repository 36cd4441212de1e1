//! # Query Module
//!
//! Typed read patterns over a `GraphStore`.
//!
//! - Every read the resolution engine performs is one `Pattern`
//! - Evaluation is written once against the store primitives, so the
//!   in-memory and redb stores answer identically
//! - Results are rows of properties in a deterministic order

use crate::graph::{GraphStore, NodeRecord};
use crate::{EdgeLabel, KernnetzError, NodeHandle, NodeLabel, PropertyValue, Row};
use std::collections::{BTreeMap, BTreeSet};

/// Read patterns supported by the store adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// `(y:Year)` ordered by year. Row: `year`.
    YearCatalog,

    /// `(s:Station)-[:IN_YEAR]->(y:Year)`. Row: station properties plus
    /// `year`, ordered by name, year, stop id.
    SnapshotStations,

    /// `(a:Station)-[:CONNECTS_TO]->(b:Station)`. Row: `from`, `to` stop ids.
    StationAdjacency,

    /// `(l:Line)-[:IN_YEAR]->(y:Year)`. Row: line properties plus `year`,
    /// ordered by name, year, line id.
    SnapshotLines,

    /// Longitudes of every station served by one snapshot line.
    /// Row: `longitude`. Stations with unset longitude are omitted.
    ServedStationLongitudes { line_id: String },

    /// `(l:Line)-[:SERVES]->(s:Station)` where line and station share a year.
    /// Row: `line_id`, `stop_id`, `year`, `stop_order`.
    ServesInSameYear,

    /// A single node by label and key. Zero or one row.
    NodeByKey { label: NodeLabel, key: String },

    /// All nodes with a label, in handle order.
    NodesByLabel { label: NodeLabel },

    /// All edges with a label. Row: edge properties plus `from` and `to` keys.
    Edges { label: EdgeLabel },
}

/// Evaluate a pattern against a store.
pub fn evaluate<G: GraphStore + ?Sized>(
    store: &G,
    pattern: &Pattern,
) -> Result<Vec<Row>, KernnetzError> {
    match pattern {
        Pattern::YearCatalog => {
            let years: BTreeSet<i64> = year_index(store)?.into_values().collect();
            Ok(years
                .into_iter()
                .map(|year| Row::new().with("year", year))
                .collect())
        }
        Pattern::SnapshotStations => snapshot_rows(store, NodeLabel::Station),
        Pattern::SnapshotLines => snapshot_rows(store, NodeLabel::Line),
        Pattern::StationAdjacency => station_adjacency(store),
        Pattern::ServedStationLongitudes { line_id } => served_longitudes(store, line_id),
        Pattern::ServesInSameYear => serves_in_same_year(store),
        Pattern::NodeByKey { label, key } => {
            let Some(handle) = store.find_node(*label, key)? else {
                return Ok(Vec::new());
            };
            Ok(store.node(handle)?.map(NodeRecord::into_row).into_iter().collect())
        }
        Pattern::NodesByLabel { label } => Ok(store
            .nodes_by_label(*label)?
            .into_iter()
            .map(NodeRecord::into_row)
            .collect()),
        Pattern::Edges { label } => {
            let mut rows = Vec::new();
            for edge in store.edges_by_label(*label)? {
                let (Some(from), Some(to)) = (store.node(edge.from)?, store.node(edge.to)?) else {
                    continue;
                };
                let mut row = Row(edge.properties);
                row.insert("from", PropertyValue::Text(from.key));
                row.insert("to", PropertyValue::Text(to.key));
                rows.push(row);
            }
            Ok(rows)
        }
    }
}

/// Year node handle -> numeric year. Year keys that do not parse are ignored.
fn year_index<G: GraphStore + ?Sized>(
    store: &G,
) -> Result<BTreeMap<NodeHandle, i64>, KernnetzError> {
    let mut index = BTreeMap::new();
    for node in store.nodes_by_label(NodeLabel::Year)? {
        match node.key.trim().parse::<i64>() {
            Ok(year) => {
                index.insert(node.handle, year);
            }
            Err(_) => tracing::warn!(key = %node.key, "ignoring Year node with non-numeric key"),
        }
    }
    Ok(index)
}

fn years_of<G: GraphStore + ?Sized>(
    store: &G,
    node: NodeHandle,
    years: &BTreeMap<NodeHandle, i64>,
) -> Result<BTreeSet<i64>, KernnetzError> {
    Ok(store
        .edges_from(node, EdgeLabel::InYear)?
        .iter()
        .filter_map(|edge| years.get(&edge.to).copied())
        .collect())
}

fn snapshot_rows<G: GraphStore + ?Sized>(
    store: &G,
    label: NodeLabel,
) -> Result<Vec<Row>, KernnetzError> {
    let years = year_index(store)?;
    let mut keyed = Vec::new();
    for node in store.nodes_by_label(label)? {
        for year in years_of(store, node.handle, &years)? {
            let name = node
                .properties
                .get("name")
                .and_then(PropertyValue::as_str)
                .unwrap_or_default()
                .to_string();
            let row = Row(node.properties.clone()).with("year", year);
            keyed.push(((name, year, node.key.clone()), row));
        }
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

fn station_adjacency<G: GraphStore + ?Sized>(store: &G) -> Result<Vec<Row>, KernnetzError> {
    let mut rows = Vec::new();
    for edge in store.edges_by_label(EdgeLabel::ConnectsTo)? {
        let (Some(from), Some(to)) = (store.node(edge.from)?, store.node(edge.to)?) else {
            continue;
        };
        if from.label != NodeLabel::Station || to.label != NodeLabel::Station {
            continue;
        }
        rows.push(Row::new().with("from", from.key).with("to", to.key));
    }
    Ok(rows)
}

fn served_longitudes<G: GraphStore + ?Sized>(
    store: &G,
    line_id: &str,
) -> Result<Vec<Row>, KernnetzError> {
    let Some(line) = store.find_node(NodeLabel::Line, line_id)? else {
        return Ok(Vec::new());
    };
    let mut rows = Vec::new();
    for edge in store.edges_from(line, EdgeLabel::Serves)? {
        let Some(station) = store.node(edge.to)? else {
            continue;
        };
        let longitude = station
            .properties
            .get("longitude")
            .and_then(PropertyValue::as_f64)
            .filter(|lon| *lon != 0.0);
        if let Some(longitude) = longitude {
            rows.push(Row::new().with("longitude", longitude));
        }
    }
    Ok(rows)
}

fn serves_in_same_year<G: GraphStore + ?Sized>(store: &G) -> Result<Vec<Row>, KernnetzError> {
    let years = year_index(store)?;
    let mut rows = Vec::new();
    for edge in store.edges_by_label(EdgeLabel::Serves)? {
        let (Some(line), Some(station)) = (store.node(edge.from)?, store.node(edge.to)?) else {
            continue;
        };
        let line_years = years_of(store, line.handle, &years)?;
        let station_years = years_of(store, station.handle, &years)?;
        let stop_order = edge
            .properties
            .get("stop_order")
            .cloned()
            .unwrap_or(PropertyValue::Null);
        for year in line_years.intersection(&station_years) {
            let mut row = Row::new()
                .with("line_id", line.key.as_str())
                .with("stop_id", station.key.as_str())
                .with("year", *year);
            row.insert("stop_order", stop_order.clone());
            rows.push(row);
        }
    }
    Ok(rows)
}

// =============================================================================
// TESTS
// =============================================================================
