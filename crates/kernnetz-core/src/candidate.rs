//! # Candidates
//!
//! Proposed core entities. Candidates are rebuilt from snapshot data on
//! every run and never persisted directly; only the core node derived from
//! them is.

use crate::activity::ActivityPeriod;
use crate::primitives::CORE_SOURCE_TAG;
use crate::{Coordinate, NodeLabel, Properties, PropertyValue, Side, TransportType, Year};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Candidates keyed by proposed core id.
pub type CandidateMap<C> = BTreeMap<String, C>;

fn slug(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

/// `core_<name>_<type>_<side>` plus `_<index>` when the group split.
#[must_use]
pub fn station_core_id(
    name: &str,
    transport_type: TransportType,
    side: Side,
    component: Option<usize>,
) -> String {
    let base = format!("core_{}_{}_{}", slug(name), transport_type, side);
    match component {
        Some(index) => format!("{base}_{index}"),
        None => base,
    }
}

/// `core_line_<name>_<type>_<side>`.
#[must_use]
pub fn line_core_id(name: &str, transport_type: TransportType, side: Side) -> String {
    format!("core_line_{}_{}_{}", slug(name), transport_type, side)
}

/// What the populator needs from any candidate.
pub trait CoreCandidate {
    /// Label of the core node.
    const CORE_LABEL: NodeLabel;
    /// Label of the constituent snapshot nodes.
    const SNAPSHOT_LABEL: NodeLabel;

    fn core_id(&self) -> &str;
    fn snapshot_ids(&self) -> &BTreeSet<String>;
    fn snapshots(&self) -> &BTreeSet<Year>;
    fn confidence(&self) -> f64;

    /// Properties written once, on creation.
    fn identity_properties(&self) -> Properties;

    /// Properties refreshed on every run besides period and confidence.
    fn refreshed_properties(&self) -> Properties {
        Properties::new()
    }

    fn activity_period(&self, catalog: &[Year]) -> ActivityPeriod {
        ActivityPeriod::compute(self.snapshots(), catalog)
    }
}

fn identity(name: &str, transport_type: TransportType, side: Side) -> Properties {
    let mut props = Properties::new();
    props.insert("name".to_string(), PropertyValue::from(name));
    props.insert("type".to_string(), PropertyValue::from(transport_type.as_str()));
    props.insert("east_west".to_string(), PropertyValue::from(side.as_str()));
    props.insert("source".to_string(), PropertyValue::from(CORE_SOURCE_TAG));
    props
}

/// A proposed core station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationCandidate {
    pub core_id: String,
    pub name: String,
    pub transport_type: TransportType,
    pub side: Side,
    /// Mean of the member positions.
    pub location: Coordinate,
    pub snapshot_ids: BTreeSet<String>,
    pub snapshots: BTreeSet<Year>,
    pub confidence: f64,
}

impl CoreCandidate for StationCandidate {
    const CORE_LABEL: NodeLabel = NodeLabel::CoreStation;
    const SNAPSHOT_LABEL: NodeLabel = NodeLabel::Station;

    fn core_id(&self) -> &str {
        &self.core_id
    }

    fn snapshot_ids(&self) -> &BTreeSet<String> {
        &self.snapshot_ids
    }

    fn snapshots(&self) -> &BTreeSet<Year> {
        &self.snapshots
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }

    fn identity_properties(&self) -> Properties {
        identity(&self.name, self.transport_type, self.side)
    }

    fn refreshed_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(
            "latitude".to_string(),
            PropertyValue::Float(self.location.latitude),
        );
        props.insert(
            "longitude".to_string(),
            PropertyValue::Float(self.location.longitude),
        );
        props
    }
}

/// A proposed core line. Lines carry no geometry; their side is resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineCandidate {
    pub core_id: String,
    pub name: String,
    pub transport_type: TransportType,
    pub side: Side,
    pub snapshot_ids: BTreeSet<String>,
    pub snapshots: BTreeSet<Year>,
    pub confidence: f64,
}

impl CoreCandidate for LineCandidate {
    const CORE_LABEL: NodeLabel = NodeLabel::CoreLine;
    const SNAPSHOT_LABEL: NodeLabel = NodeLabel::Line;

    fn core_id(&self) -> &str {
        &self.core_id
    }

    fn snapshot_ids(&self) -> &BTreeSet<String> {
        &self.snapshot_ids
    }

    fn snapshots(&self) -> &BTreeSet<Year> {
        &self.snapshots
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }

    fn identity_properties(&self) -> Properties {
        identity(&self.name, self.transport_type, self.side)
    }
}

/// Keep candidates whose confidence is at least `min_confidence`.
#[must_use]
pub fn filter_by_confidence<C: CoreCandidate + Clone>(
    candidates: &CandidateMap<C>,
    min_confidence: f64,
) -> CandidateMap<C> {
    candidates
        .iter()
        .filter(|(_, c)| c.confidence() >= min_confidence)
        .map(|(id, c)| (id.clone(), c.clone()))
        .collect()
}
