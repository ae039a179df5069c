//! CLI argument definitions using clap
//!
//! Commands:
//! - tubstore info <path>
//! - tubstore list <path> [--limit N]
//! - tubstore delete <path> <index>...
//! - tubstore delete-last <path> <n>
//! - tubstore windows <path> --length L

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tubstore - inspect and maintain append-only record tubs
#[derive(Parser, Debug)]
#[command(name = "tubstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a tub configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a manifest summary as JSON
    Info {
        /// Tub directory
        path: PathBuf,
    },

    /// Print non-deleted records as JSON lines
    List {
        /// Tub directory
        path: PathBuf,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Soft-delete records by index
    Delete {
        /// Tub directory
        path: PathBuf,

        /// Indices to delete
        #[arg(required = true)]
        indices: Vec<u64>,
    },

    /// Soft-delete the last N non-deleted records
    DeleteLast {
        /// Tub directory
        path: PathBuf,

        /// Number of records to delete
        n: usize,
    },

    /// Print the index list of every contiguous window
    Windows {
        /// Tub directory
        path: PathBuf,

        /// Records per window
        #[arg(long)]
        length: usize,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
