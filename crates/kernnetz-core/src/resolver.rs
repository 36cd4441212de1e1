//! # Core Entity Resolver
//!
//! Groups per-year snapshot stations and lines into core entity candidates.
//!
//! ## Stations
//!
//! Observations are grouped by exact `(name, type, side)`. Inside a group,
//! members that are adjacent stops on some line are kept apart: the group is
//! split into the connected components of the adjacency relation restricted
//! to the group. Each component becomes one candidate, scored by the spread
//! of its positions.
//!
//! ## Lines
//!
//! Lines are grouped the same way. Groups tagged `unified` are assigned to
//! east or west by the mean longitude of the stations their members serve,
//! read through an injected [`SideLookup`].

use crate::candidate::{
    CandidateMap, LineCandidate, StationCandidate, line_core_id, station_core_id,
};
use crate::confidence::{line_confidence, station_confidence};
use crate::graph::GraphStore;
use crate::primitives::BERLIN_DIVIDING_LONGITUDE;
use crate::query::Pattern;
use crate::snapshot::{self, SkipReason, Skipped, SnapshotLine, SnapshotStation};
use crate::{Coordinate, KernnetzError, Side, TransportType, Year};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Grouping key shared by stations and lines.
pub type GroupKey = (String, TransportType, Side);

/// Source of served-station longitudes for side resolution.
pub trait SideLookup {
    /// Longitudes of every station served by the snapshot line `line_id`.
    fn served_longitudes(&self, line_id: &str) -> Result<Vec<f64>, KernnetzError>;
}

impl<F> SideLookup for F
where
    F: Fn(&str) -> Result<Vec<f64>, KernnetzError>,
{
    fn served_longitudes(&self, line_id: &str) -> Result<Vec<f64>, KernnetzError> {
        self(line_id)
    }
}

/// Side lookup reading live station coordinates from a store.
#[derive(Debug)]
pub struct StoreSideLookup<'a, G: ?Sized> {
    store: &'a G,
}

impl<'a, G: GraphStore + ?Sized> StoreSideLookup<'a, G> {
    pub fn new(store: &'a G) -> Self {
        Self { store }
    }
}

impl<G: GraphStore + ?Sized> SideLookup for StoreSideLookup<'_, G> {
    fn served_longitudes(&self, line_id: &str) -> Result<Vec<f64>, KernnetzError> {
        Ok(self
            .store
            .query(&Pattern::ServedStationLongitudes {
                line_id: line_id.to_string(),
            })?
            .iter()
            .filter_map(|row| row.get_f64("longitude"))
            .collect())
    }
}

/// Tunables of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Longitude separating east from west. Strictly greater is east.
    pub dividing_longitude: f64,
    /// Convert unified lines without an east/west counterpart as well.
    pub resolve_standalone_unified: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dividing_longitude: BERLIN_DIVIDING_LONGITUDE,
            resolve_standalone_unified: true,
        }
    }
}

/// Output of one resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<C> {
    pub candidates: CandidateMap<C>,
    /// Records excluded from resolution.
    pub skipped: Vec<Skipped>,
    /// Groups kept in a fallback state (unified lines without geometry).
    pub unresolved: Vec<Skipped>,
}

impl<C> Default for Resolution<C> {
    fn default() -> Self {
        Self {
            candidates: CandidateMap::new(),
            skipped: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

// =============================================================================
// STATIONS
// =============================================================================

/// Connected components of `ids` under `adjacency` restricted to `ids`.
///
/// Components are returned in order of their first member in `ids`. A group
/// without internal adjacency is a single component.
#[must_use]
pub fn connected_components(
    ids: &[String],
    adjacency: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<BTreeSet<String>> {
    let members: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    let neighbours = |id: &str| {
        adjacency
            .get(id)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|n| *n != id && members.contains(n))
            .collect::<Vec<_>>()
    };

    if ids.len() <= 1 || ids.iter().all(|id| neighbours(id.as_str()).is_empty()) {
        return vec![ids.iter().cloned().collect()];
    }

    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut components = Vec::new();
    for id in ids {
        if visited.contains(id.as_str()) {
            continue;
        }
        let mut component = BTreeSet::new();
        let mut stack = vec![id.as_str()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            component.insert(current.to_string());
            stack.extend(neighbours(current).into_iter().filter(|n| !visited.contains(n)));
        }
        components.push(component);
    }
    components
}

/// Build station candidates from decoded observations and the adjacency map.
///
/// Observations must already have coordinates; any without are ignored.
#[must_use]
pub fn resolve_stations(
    stations: &[SnapshotStation],
    adjacency: &BTreeMap<String, BTreeSet<String>>,
) -> Resolution<StationCandidate> {
    let mut groups: BTreeMap<GroupKey, Vec<(&SnapshotStation, Coordinate)>> = BTreeMap::new();
    for station in stations {
        if let Some(coordinate) = station.coordinate {
            groups
                .entry((station.name.clone(), station.transport_type, station.side))
                .or_default()
                .push((station, coordinate));
        }
    }

    let mut resolution = Resolution::default();
    for ((name, transport_type, side), mut members) in groups {
        members.sort_by(|a, b| (a.0.year, &a.0.stop_id).cmp(&(b.0.year, &b.0.stop_id)));

        let mut ids: Vec<String> = Vec::new();
        for (station, _) in &members {
            if !ids.contains(&station.stop_id) {
                ids.push(station.stop_id.clone());
            }
        }

        let components = connected_components(&ids, adjacency);
        let split = components.len() > 1;
        if split {
            tracing::debug!(
                %name,
                components = components.len(),
                "adjacent same-named stations split"
            );
        }

        for (index, component) in components.into_iter().enumerate() {
            let component_members: Vec<_> = members
                .iter()
                .filter(|(s, _)| component.contains(&s.stop_id))
                .collect();
            let points: Vec<Coordinate> = component_members.iter().map(|(_, c)| *c).collect();
            let Some(location) = Coordinate::centroid(&points) else {
                continue;
            };

            let core_id = station_core_id(&name, transport_type, side, split.then_some(index));
            let candidate = StationCandidate {
                core_id: core_id.clone(),
                name: name.clone(),
                transport_type,
                side,
                location,
                snapshot_ids: component,
                snapshots: component_members.iter().map(|(s, _)| s.year).collect(),
                confidence: station_confidence(&points),
            };
            insert_candidate(&mut resolution, core_id, candidate);
        }
    }
    resolution
}

/// Distinct groups can slug to the same id (e.g. names differing only in
/// case). The first one wins; later ones are reported.
fn insert_candidate<C>(resolution: &mut Resolution<C>, core_id: String, candidate: C) {
    if resolution.candidates.contains_key(&core_id) {
        tracing::warn!(%core_id, "core id collision, keeping the first group");
        resolution.skipped.push(Skipped {
            id: core_id,
            reason: SkipReason::InvalidValue {
                field: "core_id",
                value: "collision".to_string(),
            },
        });
        return;
    }
    resolution.candidates.insert(core_id, candidate);
}

// =============================================================================
// LINES
// =============================================================================

fn group_lines(lines: &[SnapshotLine]) -> BTreeMap<GroupKey, Vec<SnapshotLine>> {
    let mut groups: BTreeMap<GroupKey, Vec<SnapshotLine>> = BTreeMap::new();
    for line in lines {
        groups
            .entry((line.name.clone(), line.transport_type, line.side))
            .or_default()
            .push(line.clone());
    }
    groups
}

/// Side of a set of snapshot lines by the mean longitude of their stations.
///
/// `Unified` when no served station has a longitude. Ties go west.
pub fn determine_line_side(
    lines: &[SnapshotLine],
    lookup: &dyn SideLookup,
    dividing_longitude: f64,
) -> Result<Side, KernnetzError> {
    let line_ids: BTreeSet<&str> = lines.iter().map(|l| l.line_id.as_str()).collect();
    let mut longitudes = Vec::new();
    for line_id in line_ids {
        longitudes.extend(lookup.served_longitudes(line_id)?);
    }
    if longitudes.is_empty() {
        return Ok(Side::Unified);
    }
    let mean = longitudes.iter().sum::<f64>() / longitudes.len() as f64;
    let side = if mean > dividing_longitude {
        Side::East
    } else {
        Side::West
    };
    tracing::debug!(mean_longitude = mean, %side, "line side determined");
    Ok(side)
}

/// Fold unified line groups into east or west groups.
pub fn resolve_unified_lines(
    groups: BTreeMap<GroupKey, Vec<SnapshotLine>>,
    lookup: &dyn SideLookup,
    config: &ResolverConfig,
) -> Result<(BTreeMap<GroupKey, Vec<SnapshotLine>>, Vec<Skipped>), KernnetzError> {
    let (unified, mut resolved): (BTreeMap<_, _>, BTreeMap<_, _>) = groups
        .into_iter()
        .partition(|((_, _, side), _)| *side == Side::Unified);
    let mut unresolved = Vec::new();
    let unified_count = unified.len();

    for ((name, transport_type, _), lines) in unified {
        let east_key = (name.clone(), transport_type, Side::East);
        let west_key = (name.clone(), transport_type, Side::West);
        let has_counterpart = resolved.contains_key(&east_key) || resolved.contains_key(&west_key);

        if !has_counterpart && !config.resolve_standalone_unified {
            resolved.insert((name, transport_type, Side::Unified), lines);
            continue;
        }

        let side = determine_line_side(&lines, lookup, config.dividing_longitude)?;
        if side == Side::Unified {
            tracing::warn!(
                %name,
                %transport_type,
                "could not resolve unified line, keeping as unified"
            );
            unresolved.push(Skipped {
                id: format!("{name} ({transport_type})"),
                reason: SkipReason::NoStationGeometry,
            });
            resolved.insert((name, transport_type, Side::Unified), lines);
            continue;
        }

        let key = (name.clone(), transport_type, side);
        match resolved.get_mut(&key) {
            Some(existing) => {
                tracing::info!(%name, %transport_type, %side, "merged unified line with counterpart");
                existing.extend(lines);
            }
            None => {
                tracing::info!(%name, %transport_type, %side, "converted unified line");
                resolved.insert(key, lines);
            }
        }
    }

    tracing::info!(unified = unified_count, "resolved unified lines");
    Ok((resolved, unresolved))
}

/// Build line candidates from decoded observations.
pub fn resolve_lines(
    lines: &[SnapshotLine],
    lookup: &dyn SideLookup,
    config: &ResolverConfig,
) -> Result<Resolution<LineCandidate>, KernnetzError> {
    let (groups, unresolved) = resolve_unified_lines(group_lines(lines), lookup, config)?;

    let mut resolution = Resolution {
        unresolved,
        ..Resolution::default()
    };
    for ((name, transport_type, side), members) in groups {
        if members.is_empty() {
            continue;
        }
        let core_id = line_core_id(&name, transport_type, side);
        let candidate = LineCandidate {
            core_id: core_id.clone(),
            name,
            transport_type,
            side,
            snapshot_ids: members.iter().map(|l| l.line_id.clone()).collect(),
            snapshots: members.iter().map(|l| l.year).collect(),
            confidence: line_confidence(members.len()),
        };
        insert_candidate(&mut resolution, core_id, candidate);
    }
    Ok(resolution)
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Reads snapshot data from a store and produces candidates.
#[derive(Debug)]
pub struct CoreEntityResolver<'a, G: ?Sized> {
    store: &'a G,
    catalog: Vec<Year>,
    config: ResolverConfig,
}

impl<'a, G: GraphStore + ?Sized> CoreEntityResolver<'a, G> {
    /// Create a resolver, loading the global year catalog.
    pub fn new(store: &'a G, config: ResolverConfig) -> Result<Self, KernnetzError> {
        let catalog = snapshot::load_year_catalog(store)?;
        tracing::info!(snapshots = ?catalog, "found snapshots");
        Ok(Self::with_catalog(store, catalog, config))
    }

    /// Create a resolver over an already loaded catalog.
    pub fn with_catalog(store: &'a G, catalog: Vec<Year>, config: ResolverConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// The sorted global year catalog.
    pub fn catalog(&self) -> &[Year] {
        &self.catalog
    }

    /// Group every located snapshot station into station candidates.
    pub fn analyze_snapshot_stations(&self) -> Result<Resolution<StationCandidate>, KernnetzError> {
        tracing::info!("analyzing snapshot stations");
        let adjacency = snapshot::load_adjacency(self.store)?;
        let loaded = snapshot::load_stations(self.store)?;

        let mut resolution = resolve_stations(&loaded.records, &adjacency);
        let mut skipped = loaded.skipped;
        skipped.append(&mut resolution.skipped);
        resolution.skipped = skipped;

        tracing::info!(
            candidates = resolution.candidates.len(),
            skipped = resolution.skipped.len(),
            "identified core station candidates"
        );
        Ok(resolution)
    }

    /// Group every snapshot line into line candidates.
    ///
    /// Station candidates are accepted for context only; side resolution
    /// always reads live per-snapshot station coordinates.
    pub fn analyze_snapshot_lines(
        &self,
        station_candidates: &CandidateMap<StationCandidate>,
    ) -> Result<Resolution<LineCandidate>, KernnetzError> {
        self.analyze_snapshot_lines_with(station_candidates, &StoreSideLookup::new(self.store))
    }

    /// As [`Self::analyze_snapshot_lines`] with an explicit side lookup.
    pub fn analyze_snapshot_lines_with(
        &self,
        station_candidates: &CandidateMap<StationCandidate>,
        lookup: &dyn SideLookup,
    ) -> Result<Resolution<LineCandidate>, KernnetzError> {
        tracing::info!(
            station_candidates = station_candidates.len(),
            "analyzing snapshot lines"
        );
        let loaded = snapshot::load_lines(self.store)?;

        let mut resolution = resolve_lines(&loaded.records, lookup, &self.config)?;
        let mut skipped = loaded.skipped;
        skipped.append(&mut resolution.skipped);
        resolution.skipped = skipped;

        tracing::info!(
            candidates = resolution.candidates.len(),
            unresolved = resolution.unresolved.len(),
            "identified core line candidates"
        );
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str, name: &str, year: Year, lat: f64, lon: f64) -> SnapshotStation {
        SnapshotStation {
            stop_id: id.to_string(),
            name: name.to_string(),
            transport_type: TransportType::UBahn,
            side: Side::East,
            year,
            coordinate: Some(Coordinate::new(lat, lon)),
            source: None,
        }
    }

    fn line(id: &str, name: &str, side: Side, year: Year) -> SnapshotLine {
        SnapshotLine {
            line_id: id.to_string(),
            name: name.to_string(),
            transport_type: TransportType::UBahn,
            side,
            year,
        }
    }

    fn adjacency(pairs: &[(&str, &str)]) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (a, b) in pairs {
            map.entry((*a).to_string()).or_default().insert((*b).to_string());
            map.entry((*b).to_string()).or_default().insert((*a).to_string());
        }
        map
    }

    fn fixed(longitudes: Vec<f64>) -> impl Fn(&str) -> Result<Vec<f64>, KernnetzError> {
        move |_| Ok(longitudes.clone())
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn components_without_internal_edges_are_one() {
        let adj = adjacency(&[("a", "x"), ("b", "y")]);
        let components = connected_components(&ids(&["a", "b", "c"]), &adj);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), 3);
    }

    #[test]
    fn components_split_disjoint_triangles() {
        let adj = adjacency(&[
            ("a1", "a2"),
            ("a2", "a3"),
            ("a3", "a1"),
            ("b1", "b2"),
            ("b2", "b3"),
            ("b3", "b1"),
        ]);
        let components =
            connected_components(&ids(&["a1", "b1", "a2", "b2", "a3", "b3"]), &adj);
        assert_eq!(components.len(), 2);
        assert!(components[0].contains("a1") && components[0].contains("a3"));
        assert!(components[1].contains("b2"));
    }

    #[test]
    fn components_ignore_edges_leaving_the_group() {
        // a - outsider - b: the path through a non-member does not join a and b
        let adj = adjacency(&[("a", "outsider"), ("outsider", "b"), ("a", "c")]);
        let components = connected_components(&ids(&["a", "b", "c"]), &adj);
        assert_eq!(components.len(), 2);
    }

    #[test]
    fn stations_group_by_name_type_side() {
        let mut other_side = station("w", "Alex", 1965, 52.52, 13.41);
        other_side.side = Side::West;
        let stations = vec![
            station("a", "Alex", 1965, 52.521, 13.411),
            station("b", "Alex", 1970, 52.5211, 13.4109),
            other_side,
        ];
        let resolution = resolve_stations(&stations, &BTreeMap::new());
        assert_eq!(resolution.candidates.len(), 2);
        let east = &resolution.candidates["core_alex_u-bahn_east"];
        assert_eq!(east.snapshot_ids.len(), 2);
        assert!((east.confidence - 0.95).abs() < f64::EPSILON);
        assert!(resolution.candidates.contains_key("core_alex_u-bahn_west"));
    }

    #[test]
    fn adjacent_same_named_stations_get_suffixes() {
        let stations = vec![
            station("s1", "Bahnhof", 1965, 52.50, 13.40),
            station("s2", "Bahnhof", 1965, 52.51, 13.40),
        ];
        let resolution = resolve_stations(&stations, &adjacency(&[("s1", "s2")]));
        let keys: Vec<_> = resolution.candidates.keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["core_bahnhof_u-bahn_east_0", "core_bahnhof_u-bahn_east_1"]
        );
        assert!(
            resolution
                .candidates
                .values()
                .all(|c| (c.confidence - 1.0).abs() < f64::EPSILON)
        );
    }

    #[test]
    fn stations_without_coordinates_are_ignored() {
        let mut unlocated = station("x", "Nowhere", 1965, 0.0, 0.0);
        unlocated.coordinate = None;
        let resolution = resolve_stations(&[unlocated], &BTreeMap::new());
        assert!(resolution.candidates.is_empty());
    }

    #[test]
    fn unified_line_merges_into_west_counterpart() {
        let lines = vec![
            line("w1", "U6", Side::West, 1970),
            line("u1", "U6", Side::Unified, 1950),
        ];
        let lookup = fixed(vec![13.0, 13.1]);
        let resolution = resolve_lines(&lines, &lookup, &ResolverConfig::default()).expect("resolve");

        assert_eq!(resolution.candidates.len(), 1);
        let west = &resolution.candidates["core_line_u6_u-bahn_west"];
        assert_eq!(
            west.snapshot_ids,
            ["u1", "w1"]
                .iter()
                .map(|s| (*s).to_string())
                .collect::<BTreeSet<_>>()
        );
        assert_eq!(west.snapshots, BTreeSet::from([1950, 1970]));
        assert!((west.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn unified_line_creates_missing_side() {
        let lines = vec![
            line("w1", "U5", Side::West, 1970),
            line("u1", "U5", Side::Unified, 1950),
        ];
        let lookup = fixed(vec![13.45, 13.5]);
        let resolution = resolve_lines(&lines, &lookup, &ResolverConfig::default()).expect("resolve");
        assert!(resolution.candidates.contains_key("core_line_u5_u-bahn_east"));
        assert!(resolution.candidates.contains_key("core_line_u5_u-bahn_west"));
    }

    #[test]
    fn tie_on_dividing_longitude_goes_west() {
        let lines = vec![line("u1", "U2", Side::Unified, 1950)];
        let lookup = fixed(vec![13.3, 13.5]);
        let side = determine_line_side(&lines, &lookup, 13.4).expect("side");
        assert_eq!(side, Side::West);
    }

    #[test]
    fn unified_line_without_geometry_stays_unified() {
        let lines = vec![
            line("e1", "U1", Side::East, 1970),
            line("u1", "U1", Side::Unified, 1950),
        ];
        let lookup = fixed(Vec::new());
        let resolution = resolve_lines(&lines, &lookup, &ResolverConfig::default()).expect("resolve");
        assert!(resolution.candidates.contains_key("core_line_u1_u-bahn_unified"));
        assert!(resolution.candidates.contains_key("core_line_u1_u-bahn_east"));
        assert_eq!(resolution.unresolved.len(), 1);
        assert_eq!(resolution.unresolved[0].reason, SkipReason::NoStationGeometry);
    }

    #[test]
    fn standalone_unified_can_be_left_alone() {
        let lines = vec![line("u1", "A1", Side::Unified, 1930)];
        let lookup = fixed(vec![13.0]);
        let config = ResolverConfig {
            resolve_standalone_unified: false,
            ..ResolverConfig::default()
        };
        let kept = resolve_lines(&lines, &lookup, &config).expect("resolve");
        assert!(kept.candidates.contains_key("core_line_a1_u-bahn_unified"));

        let converted = resolve_lines(&lines, &lookup, &ResolverConfig::default()).expect("resolve");
        assert!(converted.candidates.contains_key("core_line_a1_u-bahn_west"));
    }

    #[test]
    fn lookup_errors_propagate() {
        let lines = vec![line("u1", "X", Side::Unified, 1930)];
        let lookup = |_: &str| -> Result<Vec<f64>, KernnetzError> {
            Err(KernnetzError::IoError("store down".to_string()))
        };
        assert!(resolve_lines(&lines, &lookup, &ResolverConfig::default()).is_err());
    }
}
