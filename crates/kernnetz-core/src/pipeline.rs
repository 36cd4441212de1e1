//! # Run Pipeline
//!
//! One end-to-end core entity run: resolve stations, populate them, resolve
//! lines, populate them, then derive core relationships.
//!
//! Resolution only reads snapshot data, so each stage borrows the store
//! shared while resolving and exclusively while populating.

use crate::candidate::{CandidateMap, StationCandidate, filter_by_confidence};
use crate::graph::GraphStore;
use crate::populator::{
    CoreEntityPopulator, FailurePolicy, PopulateOptions, PopulateReport, RelationshipReport,
};
use crate::primitives::DEFAULT_MIN_CONFIDENCE;
use crate::resolver::{CoreEntityResolver, ResolverConfig};
use crate::snapshot::Skipped;
use crate::{KernnetzError, Year, snapshot};
use serde::Serialize;
use std::collections::BTreeMap;

/// Options of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub stations_only: bool,
    pub lines_only: bool,
    /// Candidates below this confidence are not persisted.
    pub min_confidence: f64,
    pub no_relationships: bool,
    pub failure_policy: FailurePolicy,
    pub resolver: ResolverConfig,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            stations_only: false,
            lines_only: false,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            no_relationships: false,
            failure_policy: FailurePolicy::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl RunOptions {
    fn validate(&self) -> Result<(), KernnetzError> {
        if self.stations_only && self.lines_only {
            return Err(KernnetzError::ConfigError(
                "stations-only and lines-only are mutually exclusive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(KernnetzError::ConfigError(format!(
                "min confidence {} outside [0, 1]",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Per entity kind outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageSummary {
    /// Candidates produced by resolution.
    pub found: usize,
    /// Candidates at or above the confidence threshold.
    pub accepted: usize,
    pub populate: PopulateReport,
    /// Snapshot records excluded from resolution, by reason.
    pub skipped: BTreeMap<&'static str, usize>,
    /// Groups left in a fallback state.
    pub unresolved: Vec<Skipped>,
}

impl StageSummary {
    fn new(found: usize, accepted: usize, skipped: &[Skipped], unresolved: Vec<Skipped>) -> Self {
        let mut by_reason = BTreeMap::new();
        for skip in skipped {
            *by_reason.entry(skip.reason.tag()).or_insert(0) += 1;
        }
        Self {
            found,
            accepted,
            populate: PopulateReport::default(),
            skipped: by_reason,
            unresolved,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub catalog: Vec<Year>,
    pub stations: Option<StageSummary>,
    pub lines: Option<StageSummary>,
    pub relationships: Option<RelationshipReport>,
}

/// Run resolution and population against `store`.
pub fn run<G: GraphStore + ?Sized>(
    store: &mut G,
    options: &RunOptions,
) -> Result<RunSummary, KernnetzError> {
    options.validate()?;
    tracing::info!(dry_run = options.dry_run, "starting core entity population");

    let catalog = snapshot::load_year_catalog(&*store)?;
    tracing::info!(snapshots = ?catalog, "found snapshots");
    let populate_options = PopulateOptions {
        dry_run: options.dry_run,
        failure_policy: options.failure_policy,
    };
    let mut summary = RunSummary {
        dry_run: options.dry_run,
        catalog: catalog.clone(),
        ..RunSummary::default()
    };

    let mut accepted_stations: CandidateMap<StationCandidate> = CandidateMap::new();
    if !options.lines_only {
        let resolution = CoreEntityResolver::with_catalog(&*store, catalog.clone(), options.resolver)
            .analyze_snapshot_stations()?;
        accepted_stations = filter_by_confidence(&resolution.candidates, options.min_confidence);
        tracing::info!(
            accepted = accepted_stations.len(),
            found = resolution.candidates.len(),
            "processing high-confidence stations"
        );

        let mut stage = StageSummary::new(
            resolution.candidates.len(),
            accepted_stations.len(),
            &resolution.skipped,
            resolution.unresolved,
        );
        stage.populate = CoreEntityPopulator::new(&mut *store, &catalog, populate_options)
            .populate_core_stations(&accepted_stations)?;
        summary.stations = Some(stage);
    }

    if !options.stations_only {
        let resolution = CoreEntityResolver::with_catalog(&*store, catalog.clone(), options.resolver)
            .analyze_snapshot_lines(&accepted_stations)?;
        let accepted_lines = filter_by_confidence(&resolution.candidates, options.min_confidence);
        tracing::info!(
            accepted = accepted_lines.len(),
            found = resolution.candidates.len(),
            "processing high-confidence lines"
        );

        let mut stage = StageSummary::new(
            resolution.candidates.len(),
            accepted_lines.len(),
            &resolution.skipped,
            resolution.unresolved,
        );
        let mut populator = CoreEntityPopulator::new(&mut *store, &catalog, populate_options);
        stage.populate = populator.populate_core_lines(&accepted_lines)?;
        summary.lines = Some(stage);

        if !options.no_relationships && !accepted_stations.is_empty() {
            summary.relationships =
                Some(populator.create_core_entity_relationships(&accepted_stations, &accepted_lines)?);
        }
    }

    tracing::info!(
        stations = summary.stations.as_ref().map_or(0, |s| s.populate.total()),
        lines = summary.lines.as_ref().map_or(0, |s| s.populate.total()),
        relationships = summary
            .relationships
            .as_ref()
            .map_or(0, |r| r.created + r.updated),
        "core entity population complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::ingestor::{Dataset, Ingestor};
    use crate::{NodeLabel, PropertyValue};

    fn seeded() -> Graph {
        let dataset = Dataset::from_json_str(
            r#"{
                "years": [1960, 1965, 1970],
                "stations": [
                    {"stop_id": "s65", "name": "Zoo", "type": "u-bahn", "east_west": "west", "year": 1965, "latitude": 52.507, "longitude": 13.332},
                    {"stop_id": "s70", "name": "Zoo", "type": "u-bahn", "east_west": "west", "year": 1970, "latitude": 52.507, "longitude": 13.332},
                    {"stop_id": "far", "name": "Nowhere", "type": "tram", "east_west": "west", "year": 1970}
                ],
                "lines": [
                    {"line_id": "l65", "name": "U1", "type": "u-bahn", "east_west": "west", "year": 1965},
                    {"line_id": "l70", "name": "U1", "type": "u-bahn", "east_west": "west", "year": 1970}
                ],
                "line_stops": [
                    {"line_id": "l65", "stop_id": "s65", "stop_order": 1},
                    {"line_id": "l70", "stop_id": "s70", "stop_order": 1}
                ]
            }"#,
        )
        .expect("parse");
        let mut graph = Graph::new();
        Ingestor::ingest(&mut graph, &dataset).expect("ingest");
        graph
    }

    #[test]
    fn full_run_populates_everything() {
        let mut graph = seeded();
        let summary = run(&mut graph, &RunOptions::default()).expect("run");

        assert_eq!(summary.catalog, vec![1960, 1965, 1970]);
        let stations = summary.stations.expect("stations ran");
        assert_eq!(stations.found, 1);
        assert_eq!(stations.populate.created, 1);
        assert_eq!(stations.skipped.get("missing_coordinates"), Some(&1));

        let lines = summary.lines.expect("lines ran");
        assert_eq!(lines.accepted, 1);
        assert_eq!(lines.populate.created, 1);

        let relationships = summary.relationships.expect("relationships ran");
        assert_eq!(relationships.created, 1);

        let core = graph
            .find_node(NodeLabel::CoreStation, "core_zoo_u-bahn_west")
            .expect("find")
            .expect("core station exists");
        let record = graph.node(core).expect("node").expect("present");
        assert_eq!(
            record.properties.get("in_lines"),
            Some(&PropertyValue::TextList(vec![
                "core_line_u1_u-bahn_west".to_string()
            ]))
        );
    }

    #[test]
    fn second_run_only_updates() {
        let mut graph = seeded();
        run(&mut graph, &RunOptions::default()).expect("first run");
        let nodes = graph.node_count().expect("count");
        let edges = graph.edge_count().expect("count");

        let summary = run(&mut graph, &RunOptions::default()).expect("second run");
        assert_eq!(summary.stations.expect("stations").populate.created, 0);
        assert_eq!(graph.node_count().expect("count"), nodes);
        assert_eq!(graph.edge_count().expect("count"), edges);
    }

    #[test]
    fn dry_run_leaves_store_untouched() {
        let mut graph = seeded();
        let nodes = graph.node_count().expect("count");
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        let summary = run(&mut graph, &options).expect("run");
        assert_eq!(summary.stations.expect("stations").populate.created, 1);
        assert_eq!(graph.node_count().expect("count"), nodes);
    }

    #[test]
    fn lines_only_skips_relationships() {
        let mut graph = seeded();
        let options = RunOptions {
            lines_only: true,
            ..RunOptions::default()
        };
        let summary = run(&mut graph, &options).expect("run");
        assert!(summary.stations.is_none());
        assert!(summary.lines.is_some());
        assert!(summary.relationships.is_none());
    }

    #[test]
    fn threshold_filters_station_candidates() {
        let mut graph = seeded();
        let options = RunOptions {
            stations_only: true,
            min_confidence: 0.96,
            ..RunOptions::default()
        };
        let summary = run(&mut graph, &options).expect("run");
        let stations = summary.stations.expect("stations");
        assert_eq!(stations.found, 1);
        assert_eq!(stations.accepted, 0);
        assert!(summary.lines.is_none());
    }

    #[test]
    fn conflicting_scopes_are_rejected() {
        let mut graph = seeded();
        let options = RunOptions {
            stations_only: true,
            lines_only: true,
            ..RunOptions::default()
        };
        assert!(matches!(
            run(&mut graph, &options),
            Err(KernnetzError::ConfigError(_))
        ));
    }
}
