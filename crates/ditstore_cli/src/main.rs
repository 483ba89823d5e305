//! ditstore CLI
//!
//! Command-line tools for ditstore log files.
//!
//! # Commands
//!
//! - `inspect` - Replay the log and show what it holds
//! - `verify` - Replay the log and check every index against the entries
//! - `dump-log` - Dump log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ditstore command-line tools.
#[derive(Parser)]
#[command(name = "ditstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the directory holding the log file
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
    /// Replay the log and show partition statistics
    Inspect {
        #[command(flatten)]
        partition: commands::PartitionArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay the log and check index consistency
    Verify {
        #[command(flatten)]
        partition: commands::PartitionArgs,
    },

    /// Dump log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip records before this offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { partition, format } => {
            let path = cli.path.ok_or("Log directory required for inspect")?;
            commands::inspect::run(&path, &partition, &format)?;
        }
        Commands::Verify { partition } => {
            let path = cli.path.ok_or("Log directory required for verify")?;
            commands::verify::run(&path, &partition)?;
        }
        Commands::DumpLog { limit, offset, format } => {
            let path = cli.path.ok_or("Log directory required for dump-log")?;
            commands::dump_log::run(&path, limit, offset, &format)?;
        }
        Commands::Version => {
            println!("ditstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("log format v{}", ditstore_core::wal::LOG_VERSION);
        }
    }

    Ok(())
}
