//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands. Each
//! command returns its report so callers other than the binary can use it.

use kernnetz_core::{
    CoreMetrics, Dataset, GraphStore, IngestReport, Ingestor, KernnetzError, NodeLabel,
    RedbGraph, RunOptions, RunSummary, verify,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum dataset file size (100 MB).
const MAX_DATASET_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Resolve `path` to an existing regular file no larger than `max_size`.
fn validate_input_file(path: &Path, max_size: u64) -> Result<PathBuf, KernnetzError> {
    let canonical = path.canonicalize().map_err(|e| {
        KernnetzError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(KernnetzError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| KernnetzError::IoError(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > max_size {
        return Err(KernnetzError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(canonical)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), KernnetzError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| KernnetzError::SerializationError(e.to_string()))?;
    println!("{text}");
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database, replacing an existing one with `force`.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), KernnetzError> {
    if db_path.exists() {
        if !force {
            return Err(KernnetzError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path).map_err(|e| {
            KernnetzError::IoError(format!("Cannot remove {}: {}", db_path.display(), e))
        })?;
    }

    RedbGraph::open(db_path)?;
    println!("Initialized new database at {}", db_path.display());
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Ingest a snapshot dataset file.
pub fn cmd_import(db_path: &Path, json_mode: bool, file: &Path) -> Result<IngestReport, KernnetzError> {
    tracing::info!(file = %file.display(), "importing dataset");

    let validated = validate_input_file(file, MAX_DATASET_FILE_SIZE)?;
    let dataset = Dataset::from_path(&validated)?;
    let mut store = RedbGraph::open(db_path)?;
    let report = Ingestor::ingest(&mut store, &dataset)?;

    if json_mode {
        print_json(&report)?;
        return Ok(report);
    }

    println!("Import Complete");
    println!("===============");
    println!("Years:       {}", report.years);
    println!("Stations:    {}", report.stations);
    println!("Lines:       {}", report.lines);
    println!("Serves:      {}", report.serves);
    println!("Connections: {}", report.connections);
    println!("Skipped:     {}", report.skipped.len());
    for skipped in &report.skipped {
        println!("  {}: {}", skipped.id, skipped.reason);
    }
    Ok(report)
}

// =============================================================================
// RESOLVE COMMAND
// =============================================================================

/// Resolve and populate core entities.
pub fn cmd_resolve(
    db_path: &Path,
    json_mode: bool,
    options: &RunOptions,
) -> Result<RunSummary, KernnetzError> {
    let mut store = RedbGraph::open(db_path)?;
    let summary = kernnetz_core::run(&mut store, options)?;

    if json_mode {
        print_json(&summary)?;
        return Ok(summary);
    }

    let mode = if summary.dry_run { " (dry run)" } else { "" };
    println!("Core Entities Population{mode}");
    println!("========================");
    println!("Snapshots: {:?}", summary.catalog);
    for (kind, stage) in [("CoreStations", &summary.stations), ("CoreLines", &summary.lines)] {
        let Some(stage) = stage else {
            continue;
        };
        println!();
        println!("{kind}:");
        println!("  Candidates: {}", stage.found);
        println!("  Accepted:   {}", stage.accepted);
        println!("  Created:    {}", stage.populate.created);
        println!("  Updated:    {}", stage.populate.updated);
        for (reason, count) in &stage.skipped {
            println!("  Skipped ({reason}): {count}");
        }
        for unresolved in &stage.unresolved {
            println!("  Unresolved: {} ({})", unresolved.id, unresolved.reason);
        }
        for failed in &stage.populate.failed {
            println!("  Failed:     {} ({})", failed.id, failed.reason);
        }
    }
    if let Some(relationships) = &summary.relationships {
        println!();
        println!("Relationships:");
        println!("  Pairs:      {}", relationships.pairs);
        println!("  Created:    {}", relationships.created);
        println!("  Updated:    {}", relationships.updated);
    }
    Ok(summary)
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

/// Verify populated core entities.
pub fn cmd_verify(
    db_path: &Path,
    json_mode: bool,
    min_confidence: f64,
) -> Result<CoreMetrics, KernnetzError> {
    let store = RedbGraph::open(db_path)?;
    let metrics = verify(&store, min_confidence)?;

    if json_mode {
        print_json(&metrics)?;
        return Ok(metrics);
    }

    println!("Core Entity Verification");
    println!("========================");
    println!("CoreStations:        {}", metrics.core_stations);
    println!("CoreLines:           {}", metrics.core_lines);
    println!("Snapshot links:      {}", metrics.snapshot_links);
    println!("Core connections:    {}", metrics.core_connections);
    println!("Unified core lines:  {}", metrics.unified_core_lines);
    println!("Low confidence:      {}", metrics.low_confidence);
    println!("Unlinked stations:   {}", metrics.unlinked_stations);
    println!("Unlinked lines:      {}", metrics.unlinked_lines);
    println!("Invalid periods:     {}", metrics.invalid_periods.len());
    for issue in &metrics.invalid_periods {
        println!("  {}: {}", issue.core_id, issue.problem);
    }
    println!();
    println!(
        "Result: {}",
        if metrics.is_consistent() { "OK" } else { "ISSUES FOUND" }
    );
    Ok(metrics)
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Node and edge counts of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub database: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_label: BTreeMap<&'static str, usize>,
}

/// Show database status.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<StatusReport, KernnetzError> {
    let store = RedbGraph::open(db_path)?;
    let mut nodes_by_label = BTreeMap::new();
    for label in [
        NodeLabel::Year,
        NodeLabel::Station,
        NodeLabel::Line,
        NodeLabel::CoreStation,
        NodeLabel::CoreLine,
    ] {
        nodes_by_label.insert(label.as_str(), store.nodes_by_label(label)?.len());
    }
    let report = StatusReport {
        database: db_path.display().to_string(),
        node_count: store.node_count()?,
        edge_count: store.edge_count()?,
        nodes_by_label,
    };

    if json_mode {
        print_json(&report)?;
        return Ok(report);
    }

    println!("Kernnetz Database Status");
    println!("========================");
    println!("Database: {}", report.database);
    println!();
    println!("Nodes: {}", report.node_count);
    for (label, count) in &report.nodes_by_label {
        println!("  {label:<12} {count}");
    }
    println!("Edges: {}", report.edge_count);
    Ok(report)
}
