//! # Resolution Scenarios
//!
//! End-to-end runs over small historical datasets, against the in-memory
//! store and the redb-backed store.

use kernnetz_core::ingestor::{Dataset, LineRecord, LineStopRecord, StationRecord};
use kernnetz_core::{
    ActivityPeriod, CoreEntityResolver, EdgeLabel, Graph, GraphStore, Ingestor, NodeLabel,
    Pattern, PropertyValue, RedbGraph, ResolverConfig, RunOptions, Side, run, verify,
};
use std::collections::BTreeSet;
use tempfile::TempDir;

const ALEX: (f64, f64) = (52.5219, 13.4132);

fn station(stop_id: &str, name: &str, year: i32, at: (f64, f64)) -> StationRecord {
    StationRecord {
        stop_id: stop_id.to_string(),
        name: name.to_string(),
        transport_type: "u-bahn".to_string(),
        east_west: "east".to_string(),
        year,
        latitude: Some(at.0),
        longitude: Some(at.1),
        source: Some("fahrplanbuch".to_string()),
    }
}

fn line(line_id: &str, name: &str, side: &str, year: i32) -> LineRecord {
    LineRecord {
        line_id: line_id.to_string(),
        name: name.to_string(),
        transport_type: "u-bahn".to_string(),
        east_west: side.to_string(),
        year,
    }
}

fn stop(line_id: &str, stop_id: &str, stop_order: i64) -> LineStopRecord {
    LineStopRecord {
        line_id: line_id.to_string(),
        stop_id: stop_id.to_string(),
        stop_order,
    }
}

fn alexanderplatz() -> Dataset {
    Dataset {
        years: vec![1960, 1965, 1970, 1975],
        stations: vec![
            station("alex65", "Alexanderplatz", 1965, ALEX),
            station("alex70", "Alexanderplatz", 1970, ALEX),
        ],
        ..Dataset::default()
    }
}

fn seed<G: GraphStore>(store: &mut G, dataset: &Dataset) {
    Ingestor::ingest(store, dataset).expect("ingest");
}

fn stored_period<G: GraphStore>(store: &G, label: NodeLabel, key: &str) -> ActivityPeriod {
    let rows = store
        .query(&Pattern::NodeByKey {
            label,
            key: key.to_string(),
        })
        .expect("query");
    let row = rows.first().expect("core node exists");
    ActivityPeriod::from_json(row.get_str("activity_period")).expect("decode")
}

// =============================================================================
// STATIONS
// =============================================================================

#[test]
fn alexanderplatz_resolves_to_one_confident_station() {
    let mut graph = Graph::new();
    seed(&mut graph, &alexanderplatz());

    let resolver = CoreEntityResolver::new(&graph, ResolverConfig::default()).expect("resolver");
    assert_eq!(resolver.catalog(), &[1960, 1965, 1970, 1975]);
    let resolution = resolver.analyze_snapshot_stations().expect("stations");

    assert_eq!(resolution.candidates.len(), 1);
    let candidate = &resolution.candidates["core_alexanderplatz_u-bahn_east"];
    assert!((candidate.confidence - 0.95).abs() < f64::EPSILON);

    let period = ActivityPeriod::compute(&candidate.snapshots, resolver.catalog());
    assert_eq!((period.start(), period.end()), (1965, 1970));
    assert!(period.missing().is_empty());
}

#[test]
fn distant_observation_lowers_confidence() {
    let mut data = alexanderplatz();
    data.stations
        .push(station("alex75", "Alexanderplatz", 1975, (ALEX.0 + 0.045, ALEX.1)));

    let mut graph = Graph::new();
    seed(&mut graph, &data);
    let resolution = CoreEntityResolver::new(&graph, ResolverConfig::default())
        .expect("resolver")
        .analyze_snapshot_stations()
        .expect("stations");

    assert_eq!(resolution.candidates.len(), 1);
    let candidate = &resolution.candidates["core_alexanderplatz_u-bahn_east"];
    assert!((candidate.confidence - 0.3).abs() < f64::EPSILON);
    assert_eq!(candidate.snapshots, BTreeSet::from([1965, 1970, 1975]));
}

#[test]
fn disjoint_triangles_split_into_two_candidates() {
    let mut data = Dataset {
        years: vec![1965],
        ..Dataset::default()
    };
    let far = (ALEX.0 + 0.1, ALEX.1);
    for (id, at) in [("a1", ALEX), ("a2", ALEX), ("a3", ALEX), ("b1", far), ("b2", far), ("b3", far)] {
        data.stations.push(station(id, "Bahnhof", 1965, at));
    }
    data.lines.push(line("ring_a", "Ring A", "east", 1965));
    data.lines.push(line("ring_b", "Ring B", "east", 1965));
    for (order, id) in ["a1", "a2", "a3", "a1"].iter().enumerate() {
        data.line_stops.push(stop("ring_a", id, order as i64));
    }
    for (order, id) in ["b1", "b2", "b3", "b1"].iter().enumerate() {
        data.line_stops.push(stop("ring_b", id, order as i64));
    }

    let mut graph = Graph::new();
    seed(&mut graph, &data);
    let resolution = CoreEntityResolver::new(&graph, ResolverConfig::default())
        .expect("resolver")
        .analyze_snapshot_stations()
        .expect("stations");

    let ids: Vec<_> = resolution.candidates.keys().cloned().collect();
    assert_eq!(
        ids,
        vec!["core_bahnhof_u-bahn_east_0", "core_bahnhof_u-bahn_east_1"]
    );
    assert_eq!(
        resolution.candidates["core_bahnhof_u-bahn_east_0"].snapshot_ids,
        BTreeSet::from(["a1".to_string(), "a2".to_string(), "a3".to_string()])
    );
}

// =============================================================================
// LINES
// =============================================================================

#[test]
fn unified_line_joins_existing_west_group() {
    let data = Dataset {
        years: vec![1965, 1970],
        stations: vec![
            station("w1", "Tegel", 1970, (52.58, 13.0)),
            station("w2", "Wedding", 1970, (52.54, 13.1)),
        ],
        lines: vec![
            line("u6_65", "U6", "west", 1965),
            line("u6_70", "U6", "unified", 1970),
        ],
        line_stops: vec![stop("u6_70", "w1", 1), stop("u6_70", "w2", 2)],
    };

    let mut graph = Graph::new();
    seed(&mut graph, &data);
    let resolver = CoreEntityResolver::new(&graph, ResolverConfig::default()).expect("resolver");
    let stations = resolver.analyze_snapshot_stations().expect("stations");
    let lines = resolver
        .analyze_snapshot_lines(&stations.candidates)
        .expect("lines");

    assert_eq!(lines.candidates.len(), 1);
    let candidate = &lines.candidates["core_line_u6_u-bahn_west"];
    assert_eq!(candidate.side, Side::West);
    assert_eq!(
        candidate.snapshot_ids,
        BTreeSet::from(["u6_65".to_string(), "u6_70".to_string()])
    );
    assert!((candidate.confidence - 0.9).abs() < f64::EPSILON);
    assert!(lines.unresolved.is_empty());
}

#[test]
fn line_without_geometry_stays_unified() {
    let data = Dataset {
        years: vec![1965],
        lines: vec![line("m1", "M1", "unified", 1965)],
        ..Dataset::default()
    };
    let mut graph = Graph::new();
    seed(&mut graph, &data);

    let summary = run(&mut graph, &RunOptions::default()).expect("run");
    let lines = summary.lines.expect("lines ran");
    assert_eq!(lines.unresolved.len(), 1);
    assert!(
        graph
            .find_node(NodeLabel::CoreLine, "core_line_m1_u-bahn_unified")
            .expect("find")
            .is_some()
    );

    let metrics = verify(&graph, 0.9).expect("verify");
    assert_eq!(metrics.unified_core_lines, 1);
    assert!(!metrics.is_consistent());
}

// =============================================================================
// FULL RUNS
// =============================================================================

fn network() -> Dataset {
    let mut data = alexanderplatz();
    data.stations.push(station("jann65", "Jannowitzbrücke", 1965, (52.5150, 13.4180)));
    data.stations.push(station("jann75", "Jannowitzbrücke", 1975, (52.5150, 13.4180)));
    data.lines.push(line("u8_65", "U8", "east", 1965));
    data.lines.push(line("u8_70", "U8", "east", 1970));
    data.line_stops.push(stop("u8_65", "alex65", 1));
    data.line_stops.push(stop("u8_65", "jann65", 2));
    data.line_stops.push(stop("u8_70", "alex70", 1));
    data
}

fn assert_populated<G: GraphStore>(store: &G) {
    let alex = stored_period(store, NodeLabel::CoreStation, "core_alexanderplatz_u-bahn_east");
    assert_eq!(alex.observed(), &BTreeSet::from([1965, 1970]));

    let jann = stored_period(store, NodeLabel::CoreStation, "core_jannowitzbrücke_u-bahn_east");
    assert_eq!(jann.missing(), &BTreeSet::from([1970]));
    assert_eq!(
        jann.missing_reasons().get(&1970).map(String::as_str),
        Some("data_gap")
    );

    let serves = store
        .query(&Pattern::Edges {
            label: EdgeLabel::ServesCore,
        })
        .expect("query");
    assert_eq!(serves.len(), 2);
    let alex_edge = serves
        .iter()
        .find(|row| row.get_str("to") == Some("core_alexanderplatz_u-bahn_east"))
        .expect("alexanderplatz served");
    assert_eq!(
        alex_edge.get("overlapping_snapshots"),
        Some(&PropertyValue::IntList(vec![1965, 1970]))
    );
    assert_eq!(alex_edge.get_f64("connection_strength"), Some(0.5));
}

#[test]
fn full_run_in_memory() {
    let mut graph = Graph::new();
    seed(&mut graph, &network());
    run(&mut graph, &RunOptions::default()).expect("run");
    assert_populated(&graph);

    let metrics = verify(&graph, 0.9).expect("verify");
    assert_eq!(metrics.core_stations, 2);
    assert_eq!(metrics.core_lines, 1);
    assert_eq!(metrics.snapshot_links, 6);
    assert_eq!(metrics.core_connections, 2);
    assert!(metrics.is_consistent());
}

#[test]
fn full_run_survives_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("kernnetz.redb");

    {
        let mut store = RedbGraph::open(&path).expect("open");
        seed(&mut store, &network());
        run(&mut store, &RunOptions::default()).expect("run");
    }

    let mut store = RedbGraph::open(&path).expect("reopen");
    assert_populated(&store);
    let edges = store.edge_count().expect("count");

    let summary = run(&mut store, &RunOptions::default()).expect("second run");
    assert_eq!(summary.stations.expect("stations").populate.created, 0);
    assert_eq!(store.edge_count().expect("count"), edges);
    assert_populated(&store);
}

#[test]
fn new_snapshot_extends_existing_period() {
    let mut graph = Graph::new();
    seed(&mut graph, &alexanderplatz());
    run(&mut graph, &RunOptions::default()).expect("first run");

    let later = Dataset {
        years: vec![1980],
        stations: vec![station("alex80", "Alexanderplatz", 1980, ALEX)],
        ..Dataset::default()
    };
    seed(&mut graph, &later);
    run(&mut graph, &RunOptions::default()).expect("second run");

    let period = stored_period(&graph, NodeLabel::CoreStation, "core_alexanderplatz_u-bahn_east");
    assert_eq!((period.start(), period.end()), (1965, 1980));
    assert_eq!(period.missing(), &BTreeSet::from([1975]));
    assert!(period.invariant_violation().is_none());
}
