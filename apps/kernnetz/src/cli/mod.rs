//! # Kernnetz CLI Module
//!
//! This module implements the CLI interface for kernnetz.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `import` - Ingest a snapshot dataset
//! - `resolve` - Resolve and populate core entities
//! - `verify` - Check populated core entities
//! - `status` - Show database status

mod commands;

use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use kernnetz_core::{FailurePolicy, KernnetzError, RunOptions};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Kernnetz - core entity resolution for the historical Berlin transit graph
///
/// Groups yearly station and line snapshots into persistent core entities.
#[derive(Parser, Debug)]
#[command(name = "kernnetz")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to the graph database
    #[arg(short = 'D', long, global = true, default_value = "kernnetz.redb")]
    pub database: PathBuf,

    /// Configuration file (defaults to ./kernnetz.toml when present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Ingest a snapshot dataset (JSON)
    Import {
        /// Path to the dataset file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Resolve snapshots into core stations and lines
    Resolve(ResolveArgs),

    /// Verify populated core entities
    Verify {
        /// Threshold below which core entities count as low confidence
        #[arg(long)]
        min_confidence: Option<f64>,
    },

    /// Show database status
    Status,
}

/// Flags of the `resolve` command.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ResolveArgs {
    /// Report what would be written without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Only process stations
    #[arg(long, conflicts_with = "lines_only")]
    pub stations_only: bool,

    /// Only process lines
    #[arg(long)]
    pub lines_only: bool,

    /// Minimum confidence for a candidate to be persisted
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Do not derive SERVES_CORE relationships
    #[arg(long)]
    pub no_relationships: bool,

    /// Record failed writes and continue instead of aborting
    #[arg(long)]
    pub skip_failed: bool,
}

impl ResolveArgs {
    /// Combine flags with file configuration. Flags win.
    pub fn run_options(&self, config: &Config) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            stations_only: self.stations_only,
            lines_only: self.lines_only,
            min_confidence: self
                .min_confidence
                .unwrap_or(config.resolution.min_confidence),
            no_relationships: self.no_relationships,
            failure_policy: if self.skip_failed {
                FailurePolicy::Skip
            } else {
                config.populate.failure_policy
            },
            resolver: config.resolver(),
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), KernnetzError> {
    let json_mode = cli.json_mode;
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&cli.database, force),
        Some(Commands::Import { file }) => {
            cmd_import(&cli.database, json_mode, &file).map(|_| ())
        }
        Some(Commands::Resolve(args)) => {
            cmd_resolve(&cli.database, json_mode, &args.run_options(&config)).map(|_| ())
        }
        Some(Commands::Verify { min_confidence }) => {
            let threshold = min_confidence.unwrap_or(config.resolution.min_confidence);
            cmd_verify(&cli.database, json_mode, threshold).map(|_| ())
        }
        Some(Commands::Status) | None => cmd_status(&cli.database, json_mode).map(|_| ()),
    }
}
