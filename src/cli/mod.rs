//! CLI module for tubstore
//!
//! Provides command-line access to a tub:
//! - info: Manifest summary
//! - list: Records as JSON lines
//! - delete / delete-last: Soft deletion
//! - windows: Contiguous windows as index lists

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{delete, delete_last, info, list, load_config, run, run_command, windows};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_json_line;
