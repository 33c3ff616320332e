//! possync CLI
//!
//! Operator tools for a till's local store.
//!
//! # Commands
//!
//! - `inspect` - Pending counts, cache population and stalled records
//! - `list` - Dump the pending records of one kind as JSON
//! - `compact` - Rewrite the store log down to live records
//! - `clear-cache` - Drop one kind of cached reference data

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// possync command-line store tools.
#[derive(Parser)]
#[command(name = "possync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show pending counts, cache population and stalled records
    Inspect {
        /// Attempt count at which a record is reported as stalled
        #[arg(long, default_value = "5")]
        high_water: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the pending records of one kind as JSON
    List {
        /// Document kind (invoice, payment, expense, delivery)
        kind: String,
    },

    /// Rewrite the store log down to live records
    Compact {
        /// Dry run - show the current log size only
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Drop one kind of cached reference data
    ClearCache {
        /// Reference kind (catalog, business, fiscal, shift)
        kind: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { high_water, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, high_water, &format)?;
        }
        Commands::List { kind } => {
            let path = cli.path.ok_or("Store path required for list")?;
            commands::list::run(&path, kind.parse()?)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::ClearCache { kind } => {
            let path = cli.path.ok_or("Store path required for clear-cache")?;
            commands::clear_cache::run(&path, kind.parse()?)?;
        }
        Commands::Version => {
            println!("possync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Store schema v{}",
                possync_core::POINT_OF_SALE_SCHEMA_VERSION
            );
        }
    }

    Ok(())
}
