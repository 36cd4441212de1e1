//! # Core Metrics
//!
//! Read-only verification of populated core entities.
//!
//! | Check | Healthy when |
//! |-------|--------------|
//! | Activity periods | every stored period decodes and is internally consistent |
//! | Snapshot links | every snapshot station/line belongs to a core entity |
//! | Unified lines | none left after side resolution |
//! | Confidence | informational, below-threshold entities are counted |
//!
//! Snapshot stations without coordinates are never resolved, so unlinked
//! stations are expected on real data and do not make a store inconsistent.

use crate::graph::{GraphStore, NodeRecord};
use crate::{ActivityPeriod, EdgeLabel, KernnetzError, NodeHandle, NodeLabel, PropertyValue, Side};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A core entity whose stored activity period is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodIssue {
    pub core_id: String,
    pub problem: String,
}

/// Metrics extracted from a store after population.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreMetrics {
    /// Total number of nodes in the store.
    pub node_count: usize,
    /// Total number of edges in the store.
    pub edge_count: usize,
    pub core_stations: usize,
    pub core_lines: usize,
    /// `HAS_SNAPSHOT` edges.
    pub snapshot_links: usize,
    /// `SERVES_CORE` edges.
    pub core_connections: usize,
    /// Core lines still carrying the `unified` side.
    pub unified_core_lines: usize,
    /// Core entities whose confidence is below the checked threshold.
    pub low_confidence: usize,
    pub invalid_periods: Vec<PeriodIssue>,
    pub unlinked_stations: usize,
    pub unlinked_lines: usize,
}

impl CoreMetrics {
    /// Whether every structural check passed.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.invalid_periods.is_empty() && self.unified_core_lines == 0 && self.unlinked_lines == 0
    }
}

fn check_period(record: &NodeRecord) -> Option<PeriodIssue> {
    let raw = record
        .properties
        .get("activity_period")
        .and_then(PropertyValue::as_str);
    let problem = match ActivityPeriod::from_json(raw) {
        Err(error) => Some(error.to_string()),
        Ok(period) if period.is_empty() => Some("missing activity period".to_string()),
        Ok(period) => period.invariant_violation(),
    }?;
    Some(PeriodIssue {
        core_id: record.key.clone(),
        problem,
    })
}

fn is_low_confidence(record: &NodeRecord, min_confidence: f64) -> bool {
    record
        .properties
        .get("source_confidence")
        .and_then(PropertyValue::as_f64)
        .is_none_or(|confidence| confidence < min_confidence)
}

/// Verify populated core entities against `min_confidence`.
pub fn verify<G: GraphStore + ?Sized>(
    store: &G,
    min_confidence: f64,
) -> Result<CoreMetrics, KernnetzError> {
    let stations = store.nodes_by_label(NodeLabel::CoreStation)?;
    let lines = store.nodes_by_label(NodeLabel::CoreLine)?;
    let links = store.edges_by_label(EdgeLabel::HasSnapshot)?;
    let linked: BTreeSet<NodeHandle> = links.iter().map(|edge| edge.to).collect();

    let mut metrics = CoreMetrics {
        node_count: store.node_count()?,
        edge_count: store.edge_count()?,
        core_stations: stations.len(),
        core_lines: lines.len(),
        snapshot_links: links.len(),
        core_connections: store.edges_by_label(EdgeLabel::ServesCore)?.len(),
        ..CoreMetrics::default()
    };

    for record in stations.iter().chain(&lines) {
        if let Some(issue) = check_period(record) {
            tracing::warn!(core_id = %issue.core_id, problem = %issue.problem, "invalid activity period");
            metrics.invalid_periods.push(issue);
        }
        if is_low_confidence(record, min_confidence) {
            metrics.low_confidence += 1;
        }
    }

    metrics.unified_core_lines = lines
        .iter()
        .filter(|record| {
            record
                .properties
                .get("east_west")
                .and_then(PropertyValue::as_str)
                == Some(Side::Unified.as_str())
        })
        .count();

    metrics.unlinked_stations = store
        .nodes_by_label(NodeLabel::Station)?
        .iter()
        .filter(|record| !linked.contains(&record.handle))
        .count();
    metrics.unlinked_lines = store
        .nodes_by_label(NodeLabel::Line)?
        .iter()
        .filter(|record| !linked.contains(&record.handle))
        .count();

    tracing::info!(
        core_stations = metrics.core_stations,
        core_lines = metrics.core_lines,
        invalid_periods = metrics.invalid_periods.len(),
        unified_core_lines = metrics.unified_core_lines,
        "verified core entities"
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, set_node_property};

    #[test]
    fn empty_store_is_consistent() {
        let metrics = verify(&Graph::new(), 0.9).expect("verify");
        assert_eq!(metrics, CoreMetrics::default());
        assert!(metrics.is_consistent());
    }

    #[test]
    fn detects_broken_periods_and_unified_lines() {
        let mut graph = Graph::new();
        let station = graph
            .upsert_node(NodeLabel::CoreStation, "core_a")
            .expect("upsert")
            .handle;
        set_node_property(&mut graph, station, "activity_period", PropertyValue::from("{oops"))
            .expect("set");
        set_node_property(&mut graph, station, "source_confidence", PropertyValue::Float(0.95))
            .expect("set");

        let line = graph
            .upsert_node(NodeLabel::CoreLine, "core_line_b")
            .expect("upsert")
            .handle;
        set_node_property(&mut graph, line, "east_west", PropertyValue::from("unified"))
            .expect("set");
        set_node_property(&mut graph, line, "source_confidence", PropertyValue::Float(0.3))
            .expect("set");

        let metrics = verify(&graph, 0.9).expect("verify");
        assert_eq!(metrics.core_stations, 1);
        assert_eq!(metrics.core_lines, 1);
        assert_eq!(metrics.unified_core_lines, 1);
        assert_eq!(metrics.low_confidence, 1);
        let ids: Vec<_> = metrics
            .invalid_periods
            .iter()
            .map(|issue| issue.core_id.as_str())
            .collect();
        assert_eq!(ids, vec!["core_a", "core_line_b"]);
        assert!(!metrics.is_consistent());
    }

    #[test]
    fn counts_unlinked_snapshots() {
        let mut graph = Graph::new();
        let core = graph
            .upsert_node(NodeLabel::CoreStation, "core_a")
            .expect("upsert")
            .handle;
        let linked = graph.upsert_node(NodeLabel::Station, "s1").expect("upsert").handle;
        graph.upsert_node(NodeLabel::Station, "s2").expect("upsert");
        graph
            .upsert_edge(EdgeLabel::HasSnapshot, core, linked)
            .expect("edge");

        let metrics = verify(&graph, 0.9).expect("verify");
        assert_eq!(metrics.snapshot_links, 1);
        assert_eq!(metrics.unlinked_stations, 1);
        assert_eq!(metrics.unlinked_lines, 0);
    }
}
