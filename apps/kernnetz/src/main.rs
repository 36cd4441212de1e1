//! # Kernnetz
//!
//! The command-line binary for core entity resolution.
//!
//! ## Usage
//!
//! ```bash
//! kernnetz init
//! kernnetz import -f snapshots.json
//! kernnetz resolve --dry-run
//! kernnetz resolve --min-confidence 0.8
//! kernnetz verify
//! ```
//!
//! Run exactly one instance per database at a time.

use clap::Parser;
use kernnetz::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // KERNNETZ_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("KERNNETZ_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "kernnetz=debug,kernnetz_core=debug"
    } else if cli.quiet {
        "kernnetz=warn,kernnetz_core=warn"
    } else {
        "kernnetz=info,kernnetz_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
