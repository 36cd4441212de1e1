//! # Resolver Benchmarks
//!
//! Performance benchmarks for station and line resolution.
//!
//! Run with: `cargo bench -p kernnetz-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use kernnetz_core::graph::Graph;
use kernnetz_core::ingestor::{Dataset, Ingestor, LineRecord, LineStopRecord, StationRecord};
use kernnetz_core::resolver::{CoreEntityResolver, ResolverConfig, resolve_stations};
use kernnetz_core::snapshot::SnapshotStation;
use kernnetz_core::{Coordinate, Side, TransportType};
use std::collections::{BTreeMap, BTreeSet};
use std::hint::black_box;

const YEARS: [i32; 6] = [1960, 1965, 1970, 1975, 1980, 1985];

/// `stations` named stations observed in every year with a small jitter.
fn observations(stations: usize) -> Vec<SnapshotStation> {
    let mut out = Vec::with_capacity(stations * YEARS.len());
    for i in 0..stations {
        for (j, year) in YEARS.iter().enumerate() {
            let jitter = j as f64 * 0.0002;
            out.push(SnapshotStation {
                stop_id: format!("{year}-{i}"),
                name: format!("Station {i}"),
                transport_type: TransportType::UBahn,
                side: Side::West,
                year: *year,
                coordinate: Some(Coordinate::new(52.5 + jitter, 13.3 + i as f64 * 0.001)),
                source: None,
            });
        }
    }
    out
}

/// A line per year running through every station.
fn dataset(stations: usize) -> Dataset {
    let mut data = Dataset {
        years: YEARS.to_vec(),
        ..Dataset::default()
    };
    for year in YEARS {
        let line_id = format!("{year}-line");
        data.lines.push(LineRecord {
            line_id: line_id.clone(),
            name: "U1".to_string(),
            transport_type: "u-bahn".to_string(),
            east_west: "unified".to_string(),
            year,
        });
        for i in 0..stations {
            data.stations.push(StationRecord {
                stop_id: format!("{year}-{i}"),
                name: format!("Station {i}"),
                transport_type: "u-bahn".to_string(),
                east_west: "west".to_string(),
                year,
                latitude: Some(52.5),
                longitude: Some(13.3 + i as f64 * 0.001),
                source: None,
            });
            data.line_stops.push(LineStopRecord {
                line_id: line_id.clone(),
                stop_id: format!("{year}-{i}"),
                stop_order: i as i64,
            });
        }
    }
    data
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_resolve_stations(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_stations");

    for size in [10, 100, 1000] {
        let stations = observations(size);
        let adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        group.bench_with_input(BenchmarkId::from_parameter(size), &stations, |b, stations| {
            b.iter(|| resolve_stations(black_box(stations), &adjacency));
        });
    }

    group.finish();
}

fn bench_analyze_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze_store");

    for size in [10, 100] {
        let mut graph = Graph::new();
        Ingestor::ingest(&mut graph, &dataset(size)).expect("ingest");
        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            b.iter(|| {
                let resolver = CoreEntityResolver::new(graph, ResolverConfig::default())
                    .expect("resolver");
                let stations = resolver.analyze_snapshot_stations().expect("stations");
                resolver
                    .analyze_snapshot_lines(black_box(&stations.candidates))
                    .expect("lines")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve_stations, bench_analyze_store);
criterion_main!(benches);
