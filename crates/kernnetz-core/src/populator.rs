//! # Core Entity Populator
//!
//! Writes candidates into the store as core nodes.
//!
//! - Every write is an upsert-by-key, so a run can be repeated or resumed
//!   after a crash without duplicating anything
//! - Existing activity periods are merged, never replaced
//! - Dry-run mode only reads, and reports what a real run would do
//! - Confidence filtering happens before the populator is called

use crate::activity::ActivityPeriod;
use crate::candidate::{CandidateMap, CoreCandidate, LineCandidate, StationCandidate};
use crate::graph::GraphStore;
use crate::snapshot::{self, SkipReason, Skipped};
use crate::{
    EdgeLabel, KernnetzError, NodeHandle, NodeLabel, Properties, PropertyValue, Upserted, Year,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// What to do when persisting one candidate fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the batch and propagate the error.
    #[default]
    Abort,
    /// Log, record the failure in the report, and continue.
    Skip,
}

impl FromStr for FailurePolicy {
    type Err = KernnetzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(KernnetzError::ConfigError(format!(
                "unknown failure policy '{other}' (expected 'abort' or 'skip')"
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// Options controlling a populator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateOptions {
    pub dry_run: bool,
    pub failure_policy: FailurePolicy,
}

/// Outcome of populating one kind of core entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopulateReport {
    pub created: usize,
    pub updated: usize,
    /// `HAS_SNAPSHOT` edges newly created.
    pub snapshot_links: usize,
    /// Constituent snapshot ids with no snapshot node in the store.
    pub missing_snapshots: usize,
    pub failed: Vec<Skipped>,
}

impl PopulateReport {
    /// Created plus updated.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

/// One derived core line -> core station connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreConnection {
    /// Years in which some member line served some member station.
    pub years: BTreeSet<Year>,
    /// `|years| / |catalog|`.
    pub strength: f64,
}

/// Connections keyed by `(core line id, core station id)`.
pub type ConnectionMap = BTreeMap<(String, String), CoreConnection>;

/// Outcome of deriving `SERVES_CORE` edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationshipReport {
    /// Distinct (core line, core station) pairs found.
    pub pairs: usize,
    pub created: usize,
    pub updated: usize,
    /// Core stations that gained a line in `in_lines`.
    pub in_lines_added: usize,
    /// Serve records that could not be decoded.
    pub skipped_facts: usize,
    pub failed: Vec<Skipped>,
}

/// Aggregate same-year serve facts into core connections.
///
/// Facts whose line or station is not part of any candidate are ignored.
#[must_use]
pub fn analyze_core_connections(
    facts: &[snapshot::ServeFact],
    stations: &CandidateMap<StationCandidate>,
    lines: &CandidateMap<LineCandidate>,
    catalog_len: usize,
) -> ConnectionMap {
    let station_index = reverse_index(stations);
    let line_index = reverse_index(lines);

    let mut years: BTreeMap<(String, String), BTreeSet<Year>> = BTreeMap::new();
    for fact in facts {
        let (Some(core_line), Some(core_station)) = (
            line_index.get(fact.line_id.as_str()),
            station_index.get(fact.stop_id.as_str()),
        ) else {
            continue;
        };
        years
            .entry(((*core_line).to_string(), (*core_station).to_string()))
            .or_default()
            .insert(fact.year);
    }

    years
        .into_iter()
        .map(|(pair, years)| {
            let strength = if catalog_len == 0 {
                0.0
            } else {
                years.len() as f64 / catalog_len as f64
            };
            (pair, CoreConnection { years, strength })
        })
        .collect()
}

/// Snapshot id -> core id. A snapshot belongs to at most one candidate.
fn reverse_index<C: CoreCandidate>(candidates: &CandidateMap<C>) -> BTreeMap<&str, &str> {
    let mut index = BTreeMap::new();
    for (core_id, candidate) in candidates {
        for snapshot_id in candidate.snapshot_ids() {
            if let Some(previous) = index.insert(snapshot_id.as_str(), core_id.as_str()) {
                tracing::warn!(
                    %snapshot_id,
                    first = previous,
                    second = %core_id,
                    "snapshot claimed by two candidates"
                );
            }
        }
    }
    index
}

fn now() -> PropertyValue {
    PropertyValue::Text(chrono::Utc::now().to_rfc3339())
}

fn props<const N: usize>(entries: [(&str, PropertyValue); N]) -> Properties {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Creates and updates core nodes and their edges.
#[derive(Debug)]
pub struct CoreEntityPopulator<'a, G: ?Sized> {
    store: &'a mut G,
    catalog: &'a [Year],
    options: PopulateOptions,
}

impl<'a, G: GraphStore + ?Sized> CoreEntityPopulator<'a, G> {
    pub fn new(store: &'a mut G, catalog: &'a [Year], options: PopulateOptions) -> Self {
        Self {
            store,
            catalog,
            options,
        }
    }

    /// Upsert core stations and link them to their snapshot stations.
    pub fn populate_core_stations(
        &mut self,
        candidates: &CandidateMap<StationCandidate>,
    ) -> Result<PopulateReport, KernnetzError> {
        self.populate(candidates)
    }

    /// Upsert core lines and link them to their snapshot lines.
    pub fn populate_core_lines(
        &mut self,
        candidates: &CandidateMap<LineCandidate>,
    ) -> Result<PopulateReport, KernnetzError> {
        self.populate(candidates)
    }

    fn populate<C: CoreCandidate>(
        &mut self,
        candidates: &CandidateMap<C>,
    ) -> Result<PopulateReport, KernnetzError> {
        let label = C::CORE_LABEL;
        tracing::info!(count = candidates.len(), %label, "creating/updating core nodes");

        let mut report = PopulateReport::default();

        if self.options.dry_run {
            for core_id in candidates.keys() {
                if self.store.find_node(label, core_id)?.is_some() {
                    report.updated += 1;
                } else {
                    report.created += 1;
                }
            }
            tracing::info!(
                would_create = report.created,
                would_update = report.updated,
                %label,
                "[DRY RUN] no changes written"
            );
            return Ok(report);
        }

        for candidate in candidates.values() {
            match self.persist(candidate, &mut report) {
                Ok(upserted) if upserted.created => report.created += 1,
                Ok(_) => report.updated += 1,
                Err(error) => self.handle_failure(candidate.core_id(), error, &mut report.failed)?,
            }
        }

        tracing::info!(
            created = report.created,
            updated = report.updated,
            failed = report.failed.len(),
            %label,
            "core nodes written"
        );
        Ok(report)
    }

    fn handle_failure(
        &self,
        id: &str,
        error: KernnetzError,
        failed: &mut Vec<Skipped>,
    ) -> Result<(), KernnetzError> {
        match self.options.failure_policy {
            FailurePolicy::Abort => Err(error),
            FailurePolicy::Skip => {
                tracing::warn!(%id, %error, "failed to persist, skipping");
                failed.push(Skipped {
                    id: id.to_string(),
                    reason: SkipReason::PersistFailed {
                        error: error.to_string(),
                    },
                });
                Ok(())
            }
        }
    }

    fn persist<C: CoreCandidate>(
        &mut self,
        candidate: &C,
        report: &mut PopulateReport,
    ) -> Result<Upserted<NodeHandle>, KernnetzError> {
        let upserted = self.store.upsert_node(C::CORE_LABEL, candidate.core_id())?;
        let handle = upserted.handle;
        let incoming = candidate.activity_period(self.catalog);

        let existing = if upserted.created {
            None
        } else {
            self.store.node(handle)?.map(|record| record.properties)
        };

        let mut properties = Properties::new();
        let period = match &existing {
            // A node without created_date was interrupted between key
            // creation and its first property write.
            Some(stored) if stored.contains_key("created_date") => {
                let current = ActivityPeriod::from_json(
                    stored.get("activity_period").and_then(PropertyValue::as_str),
                )?;
                properties.insert("updated_date".to_string(), now());
                ActivityPeriod::merge(&current, &incoming, self.catalog)
            }
            _ => {
                properties.extend(candidate.identity_properties());
                properties.insert("created_date".to_string(), now());
                incoming
            }
        };

        properties.insert(
            "activity_period".to_string(),
            PropertyValue::Text(period.to_json()?),
        );
        properties.insert(
            "source_confidence".to_string(),
            PropertyValue::Float(candidate.confidence()),
        );
        properties.extend(candidate.refreshed_properties());
        self.store.set_node_properties(handle, properties)?;

        for snapshot_id in candidate.snapshot_ids() {
            let Some(snapshot) = self.store.find_node(C::SNAPSHOT_LABEL, snapshot_id)? else {
                tracing::warn!(%snapshot_id, core_id = candidate.core_id(), "snapshot node not found");
                report.missing_snapshots += 1;
                continue;
            };
            let edge = self.store.upsert_edge(EdgeLabel::HasSnapshot, handle, snapshot)?;
            let mut edge_props = props([(
                "confidence",
                PropertyValue::Float(candidate.confidence()),
            )]);
            if edge.created {
                edge_props.insert("created_date".to_string(), now());
                report.snapshot_links += 1;
            }
            self.store.set_edge_properties(edge.handle, edge_props)?;
        }

        Ok(upserted)
    }

    /// Derive `SERVES_CORE` edges and `in_lines` from same-year serve facts.
    pub fn create_core_entity_relationships(
        &mut self,
        stations: &CandidateMap<StationCandidate>,
        lines: &CandidateMap<LineCandidate>,
    ) -> Result<RelationshipReport, KernnetzError> {
        tracing::info!("creating core station/line relationships");

        let facts = snapshot::load_serve_facts(&*self.store)?;
        let connections =
            analyze_core_connections(&facts.records, stations, lines, self.catalog.len());
        let mut report = RelationshipReport {
            pairs: connections.len(),
            skipped_facts: facts.skipped.len(),
            ..RelationshipReport::default()
        };

        if self.options.dry_run {
            tracing::info!(pairs = report.pairs, "[DRY RUN] would write SERVES_CORE relationships");
            return Ok(report);
        }

        for ((core_line, core_station), connection) in &connections {
            match self.persist_connection(core_line, core_station, connection) {
                Ok((created, in_lines_added)) => {
                    if created {
                        report.created += 1;
                    } else {
                        report.updated += 1;
                    }
                    if in_lines_added {
                        report.in_lines_added += 1;
                    }
                }
                Err(error) => {
                    let id = format!("{core_line} -> {core_station}");
                    self.handle_failure(&id, error, &mut report.failed)?;
                }
            }
        }

        tracing::info!(
            created = report.created,
            updated = report.updated,
            "core relationships written"
        );
        Ok(report)
    }

    /// Returns (edge created, line appended to `in_lines`).
    fn persist_connection(
        &mut self,
        core_line: &str,
        core_station: &str,
        connection: &CoreConnection,
    ) -> Result<(bool, bool), KernnetzError> {
        let line = self
            .store
            .find_node(NodeLabel::CoreLine, core_line)?
            .ok_or_else(|| KernnetzError::InvalidRecord(format!("core line '{core_line}' not persisted")))?;
        let station = self
            .store
            .find_node(NodeLabel::CoreStation, core_station)?
            .ok_or_else(|| {
                KernnetzError::InvalidRecord(format!("core station '{core_station}' not persisted"))
            })?;

        let edge = self.store.upsert_edge(EdgeLabel::ServesCore, line, station)?;
        let mut edge_props = props([
            (
                "overlapping_snapshots",
                PropertyValue::IntList(connection.years.iter().map(|y| i64::from(*y)).collect()),
            ),
            ("connection_strength", PropertyValue::Float(connection.strength)),
        ]);
        let date_field = if edge.created { "created_date" } else { "updated_date" };
        edge_props.insert(date_field.to_string(), now());
        self.store.set_edge_properties(edge.handle, edge_props)?;

        let mut in_lines: Vec<String> = self
            .store
            .node(station)?
            .and_then(|record| {
                record
                    .properties
                    .get("in_lines")
                    .and_then(PropertyValue::as_text_list)
                    .map(<[String]>::to_vec)
            })
            .unwrap_or_default();
        let appended = !in_lines.iter().any(|l| l == core_line);
        if appended {
            in_lines.push(core_line.to_string());
            self.store
                .set_node_properties(station, props([("in_lines", PropertyValue::TextList(in_lines))]))?;
        }

        Ok((edge.created, appended))
    }
}
