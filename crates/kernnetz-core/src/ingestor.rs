//! # Ingestor Module
//!
//! Snapshot dataset validation and ingestion.
//!
//! - Validate records before graph mutation
//! - Skip malformed records, reporting each one
//! - Upserts only, so re-importing a dataset is a no-op
//! - Derives station adjacency from consecutive stop orders

use crate::graph::{GraphStore, set_node_property};
use crate::primitives::{
    MAX_IDENTIFIER_LENGTH, MAX_NAME_LENGTH, MAX_SNAPSHOT_YEAR, MIN_SNAPSHOT_YEAR,
};
use crate::snapshot::{SkipReason, Skipped};
use crate::{
    EdgeLabel, KernnetzError, NodeHandle, NodeLabel, Properties, PropertyValue, Side,
    TransportType, Year,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One station observation in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub stop_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub transport_type: String,
    pub east_west: String,
    pub year: Year,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

/// One line observation in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub line_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub transport_type: String,
    pub east_west: String,
    pub year: Year,
}

/// A line stopping at a station at position `stop_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStopRecord {
    pub line_id: String,
    pub stop_id: String,
    pub stop_order: i64,
}

/// A snapshot dataset as produced by upstream ETL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    /// Snapshot years known to exist, observed or not.
    pub years: Vec<Year>,
    pub stations: Vec<StationRecord>,
    pub lines: Vec<LineRecord>,
    pub line_stops: Vec<LineStopRecord>,
}

impl Dataset {
    /// Parse a dataset from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, KernnetzError> {
        serde_json::from_str(json).map_err(|e| KernnetzError::DeserializationError(e.to_string()))
    }

    /// Read and parse a dataset file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, KernnetzError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| KernnetzError::IoError(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub years: usize,
    pub stations: usize,
    pub lines: usize,
    pub serves: usize,
    /// `CONNECTS_TO` edges newly created.
    pub connections: usize,
    pub skipped: Vec<Skipped>,
}

/// The Ingestor handles dataset validation and graph ingestion.
pub struct Ingestor;

impl Ingestor {
    fn check_text(value: &str, field: &'static str, max: usize) -> Result<(), SkipReason> {
        if value.trim().is_empty() {
            return Err(SkipReason::MissingField { field });
        }
        if value.len() > max {
            return Err(SkipReason::InvalidValue {
                field,
                value: format!("{} bytes", value.len()),
            });
        }
        Ok(())
    }

    fn check_year(year: Year) -> Result<(), SkipReason> {
        if !(MIN_SNAPSHOT_YEAR..=MAX_SNAPSHOT_YEAR).contains(&year) {
            return Err(SkipReason::InvalidValue {
                field: "year",
                value: year.to_string(),
            });
        }
        Ok(())
    }

    fn check_enums(transport_type: &str, side: &str) -> Result<(), SkipReason> {
        transport_type
            .parse::<TransportType>()
            .map_err(|_| SkipReason::InvalidValue {
                field: "type",
                value: transport_type.to_string(),
            })?;
        side.parse::<Side>().map_err(|_| SkipReason::InvalidValue {
            field: "east_west",
            value: side.to_string(),
        })?;
        Ok(())
    }

    /// Validate a station record.
    pub fn validate_station(record: &StationRecord) -> Result<(), SkipReason> {
        Self::check_text(&record.stop_id, "stop_id", MAX_IDENTIFIER_LENGTH)?;
        Self::check_text(&record.name, "name", MAX_NAME_LENGTH)?;
        Self::check_enums(&record.transport_type, &record.east_west)?;
        Self::check_year(record.year)?;
        for (field, value) in [("latitude", record.latitude), ("longitude", record.longitude)] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(SkipReason::InvalidValue {
                    field,
                    value: format!("{value:?}"),
                });
            }
        }
        Ok(())
    }

    /// Validate a line record.
    pub fn validate_line(record: &LineRecord) -> Result<(), SkipReason> {
        Self::check_text(&record.line_id, "line_id", MAX_IDENTIFIER_LENGTH)?;
        Self::check_text(&record.name, "name", MAX_NAME_LENGTH)?;
        Self::check_enums(&record.transport_type, &record.east_west)?;
        Self::check_year(record.year)
    }

    fn year_node<G: GraphStore + ?Sized>(
        graph: &mut G,
        year: Year,
        report: &mut IngestReport,
    ) -> Result<NodeHandle, KernnetzError> {
        let upserted = graph.upsert_node(NodeLabel::Year, &year.to_string())?;
        if upserted.created {
            report.years += 1;
        }
        Ok(upserted.handle)
    }

    /// Ingest a dataset into any graph store.
    ///
    /// Works with both in-memory Graph and persistent RedbGraph. Store
    /// failures abort the import; invalid records are skipped.
    pub fn ingest<G: GraphStore + ?Sized>(
        graph: &mut G,
        dataset: &Dataset,
    ) -> Result<IngestReport, KernnetzError> {
        let mut report = IngestReport::default();

        for year in &dataset.years {
            match Self::check_year(*year) {
                Ok(()) => {
                    Self::year_node(graph, *year, &mut report)?;
                }
                Err(reason) => report.skipped.push(Skipped {
                    id: year.to_string(),
                    reason,
                }),
            }
        }

        for record in &dataset.stations {
            if let Err(reason) = Self::validate_station(record) {
                tracing::warn!(stop_id = %record.stop_id, %reason, "skipping station");
                report.skipped.push(Skipped {
                    id: record.stop_id.clone(),
                    reason,
                });
                continue;
            }
            let year = Self::year_node(graph, record.year, &mut report)?;
            let node = graph.upsert_node(NodeLabel::Station, &record.stop_id)?.handle;

            let mut props = Properties::new();
            props.insert("name".to_string(), PropertyValue::from(record.name.as_str()));
            props.insert(
                "type".to_string(),
                PropertyValue::from(record.transport_type.trim().to_lowercase()),
            );
            props.insert(
                "east_west".to_string(),
                PropertyValue::from(record.east_west.trim().to_lowercase()),
            );
            for (field, value) in [("latitude", record.latitude), ("longitude", record.longitude)] {
                props.insert(
                    field.to_string(),
                    value.map_or(PropertyValue::Null, PropertyValue::Float),
                );
            }
            if let Some(source) = &record.source {
                props.insert("source".to_string(), PropertyValue::from(source.as_str()));
            }
            graph.set_node_properties(node, props)?;
            graph.upsert_edge(EdgeLabel::InYear, node, year)?;
            report.stations += 1;
        }

        for record in &dataset.lines {
            if let Err(reason) = Self::validate_line(record) {
                tracing::warn!(line_id = %record.line_id, %reason, "skipping line");
                report.skipped.push(Skipped {
                    id: record.line_id.clone(),
                    reason,
                });
                continue;
            }
            let year = Self::year_node(graph, record.year, &mut report)?;
            let node = graph.upsert_node(NodeLabel::Line, &record.line_id)?.handle;
            set_node_property(graph, node, "name", PropertyValue::from(record.name.as_str()))?;
            set_node_property(
                graph,
                node,
                "type",
                PropertyValue::from(record.transport_type.trim().to_lowercase()),
            )?;
            set_node_property(
                graph,
                node,
                "east_west",
                PropertyValue::from(record.east_west.trim().to_lowercase()),
            )?;
            graph.upsert_edge(EdgeLabel::InYear, node, year)?;
            report.lines += 1;
        }

        // line handle -> stop_order -> station handles
        let mut sequences: BTreeMap<NodeHandle, BTreeMap<i64, BTreeSet<NodeHandle>>> =
            BTreeMap::new();
        for record in &dataset.line_stops {
            let id = format!("{}@{}", record.line_id, record.stop_id);
            let Some(line) = graph.find_node(NodeLabel::Line, &record.line_id)? else {
                report.skipped.push(Skipped {
                    id,
                    reason: SkipReason::InvalidValue {
                        field: "line_id",
                        value: record.line_id.clone(),
                    },
                });
                continue;
            };
            let Some(station) = graph.find_node(NodeLabel::Station, &record.stop_id)? else {
                report.skipped.push(Skipped {
                    id,
                    reason: SkipReason::InvalidValue {
                        field: "stop_id",
                        value: record.stop_id.clone(),
                    },
                });
                continue;
            };
            let edge = graph.upsert_edge(EdgeLabel::Serves, line, station)?;
            let mut props = Properties::new();
            props.insert("stop_order".to_string(), PropertyValue::Int(record.stop_order));
            graph.set_edge_properties(edge.handle, props)?;
            sequences
                .entry(line)
                .or_default()
                .entry(record.stop_order)
                .or_default()
                .insert(station);
            report.serves += 1;
        }

        report.connections = Self::connect_stations(graph, &sequences)?;

        tracing::info!(
            years = report.years,
            stations = report.stations,
            lines = report.lines,
            serves = report.serves,
            connections = report.connections,
            skipped = report.skipped.len(),
            "dataset ingested"
        );
        Ok(report)
    }

    /// Create `CONNECTS_TO` edges between stops `n` and `n + 1` of each line,
    /// accumulating the line ids and names that connect them.
    fn connect_stations<G: GraphStore + ?Sized>(
        graph: &mut G,
        sequences: &BTreeMap<NodeHandle, BTreeMap<i64, BTreeSet<NodeHandle>>>,
    ) -> Result<usize, KernnetzError> {
        let mut created = 0;
        for (line, stops) in sequences {
            let Some(line_record) = graph.node(*line)? else {
                continue;
            };
            let line_name = line_record
                .properties
                .get("name")
                .and_then(PropertyValue::as_str)
                .unwrap_or_default()
                .to_string();

            for (order, stations) in stops {
                let Some(next) = order.checked_add(1).and_then(|n| stops.get(&n)) else {
                    continue;
                };
                for from in stations {
                    for to in next {
                        if from == to {
                            continue;
                        }
                        let edge = graph.upsert_edge(EdgeLabel::ConnectsTo, *from, *to)?;
                        if edge.created {
                            created += 1;
                        }
                        let existing = graph
                            .edges_from(*from, EdgeLabel::ConnectsTo)?
                            .into_iter()
                            .find(|e| e.handle == edge.handle)
                            .map(|e| e.properties)
                            .unwrap_or_default();

                        let mut props = Properties::new();
                        for (field, value) in [
                            ("line_ids", line_record.key.as_str()),
                            ("line_names", line_name.as_str()),
                        ] {
                            let mut list: Vec<String> = existing
                                .get(field)
                                .and_then(PropertyValue::as_text_list)
                                .map(<[String]>::to_vec)
                                .unwrap_or_default();
                            if !list.iter().any(|v| v == value) {
                                list.push(value.to_string());
                            }
                            props.insert(field.to_string(), PropertyValue::TextList(list));
                        }
                        if let Some(transport_type) = line_record.properties.get("type") {
                            props.insert("transport_type".to_string(), transport_type.clone());
                        }
                        graph.set_edge_properties(edge.handle, props)?;
                    }
                }
            }
        }
        Ok(created)
    }
}
