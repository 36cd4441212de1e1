//! # kernnetz-core
//!
//! Core entity resolution for a historical transit knowledge graph.
//!
//! Snapshot observations of stations and lines, one set per surveyed year,
//! are grouped into persistent core entities that carry an activity period
//! across all snapshots.
//!
//! ## Layers
//!
//! - `graph` / `storage`: the property-graph store contract, an in-memory
//!   store and a redb-backed store
//! - `query`: typed read patterns evaluated over any store
//! - `snapshot`: decoding of per-year snapshot records
//! - `resolver`: grouping of snapshots into candidates
//! - `populator`: idempotent persistence of candidates as core nodes
//! - `pipeline`: one full run; `system`: post-run verification
//!
//! No async, no network. Every write is an upsert, so runs are repeatable.

// =============================================================================
// MODULES
// =============================================================================

pub mod activity;
pub mod candidate;
pub mod confidence;
pub mod graph;
pub mod ingestor;
pub mod pipeline;
pub mod populator;
pub mod primitives;
pub mod query;
pub mod resolver;
pub mod snapshot;
pub mod storage;
pub mod system;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    Coordinate, EdgeHandle, EdgeLabel, KernnetzError, NodeHandle, NodeLabel, Properties,
    PropertyValue, Row, Side, TransportType, Upserted, Year,
};

// =============================================================================
// RE-EXPORTS: Store and Resolution
// =============================================================================

pub use activity::ActivityPeriod;
pub use candidate::{CandidateMap, CoreCandidate, LineCandidate, StationCandidate};
pub use graph::{EdgeRecord, Graph, GraphStore, NodeRecord};
pub use ingestor::{Dataset, IngestReport, Ingestor};
pub use pipeline::{RunOptions, RunSummary, StageSummary, run};
pub use populator::{CoreEntityPopulator, FailurePolicy, PopulateOptions, PopulateReport};
pub use query::Pattern;
pub use resolver::{CoreEntityResolver, ResolverConfig, SideLookup};
pub use storage::RedbGraph;

// =============================================================================
// RE-EXPORTS: System
// =============================================================================

pub use system::{CoreMetrics, PeriodIssue, verify};
