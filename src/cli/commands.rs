//! CLI command implementations
//!
//! Every command opens the tub with its stored schema, does one thing and
//! writes JSON lines to `out`. Mutating commands go through the same durable
//! paths as library callers.
//!
//! Stdout carries command output only; log events go to stderr.

use std::io::{self, Write};
use std::path::Path;

use serde_json::{json, Value};

use crate::catalog::Record;
use crate::collator::Collator;
use crate::config::TubConfig;
use crate::errors::TubResult;
use crate::observability::{LogTarget, Logger};
use crate::tub::Tub;

use super::args::{Cli, Command};
use super::errors::CliResult;
use super::io::write_json_line;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    Logger::set_target(LogTarget::Stderr);
    let config = load_config(cli.config.as_deref())?;
    config.apply_logging()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_command(cli.command, &config, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command, config: &TubConfig, out: &mut dyn Write) -> CliResult<()> {
    match cmd {
        Command::Info { path } => info(&path, config, out),
        Command::List { path, limit } => list(&path, limit, config, out),
        Command::Delete { path, indices } => delete(&path, indices, config, out),
        Command::DeleteLast { path, n } => delete_last(&path, n, config, out),
        Command::Windows { path, length } => windows(&path, length, config, out),
    }
}

/// Configuration from `--config`, or the defaults
pub fn load_config(path: Option<&Path>) -> CliResult<TubConfig> {
    match path {
        Some(path) => Ok(TubConfig::load(path)?),
        None => Ok(TubConfig::default()),
    }
}

fn open_tub(path: &Path, config: &TubConfig) -> CliResult<Tub> {
    Ok(Tub::load_with_config(path, config.clone())?)
}

/// Manifest summary
pub fn info(path: &Path, config: &TubConfig, out: &mut dyn Write) -> CliResult<()> {
    let tub = open_tub(path, config)?;
    let manifest = tub.manifest();

    let metadata: Vec<Value> = tub
        .metadata()
        .iter()
        .map(|(key, value)| json!([key, value]))
        .collect();

    let summary = json!({
        "path": tub.base_path().display().to_string(),
        "tub_id": tub.tub_id().to_string(),
        "created_at": manifest.created_at().to_rfc3339(),
        "inputs": tub.schema().inputs(),
        "types": tub.schema().types(),
        "metadata": metadata,
        "length": tub.len(),
        "current_index": manifest.current_index(),
        "deleted_indexes": tub.deleted_indexes(),
        "max_catalog_len": manifest.max_catalog_len(),
        "segments": manifest.segments(),
    });
    write_json_line(out, &summary)
}

/// Non-deleted records, optionally capped at `limit`
pub fn list(
    path: &Path,
    limit: Option<usize>,
    config: &TubConfig,
    out: &mut dyn Write,
) -> CliResult<()> {
    let tub = open_tub(path, config)?;
    for record in tub.iter().take(limit.unwrap_or(usize::MAX)) {
        write_json_line(out, &record?.to_value())?;
    }
    Ok(())
}

pub fn delete(
    path: &Path,
    indices: Vec<u64>,
    config: &TubConfig,
    out: &mut dyn Write,
) -> CliResult<()> {
    let mut tub = open_tub(path, config)?;
    let deleted = tub.delete_records(indices)?;
    write_json_line(out, &json!({ "deleted": deleted, "length": tub.len() }))
}

pub fn delete_last(path: &Path, n: usize, config: &TubConfig, out: &mut dyn Write) -> CliResult<()> {
    let mut tub = open_tub(path, config)?;
    let deleted = tub.delete_last_n_records(n)?;
    write_json_line(out, &json!({ "deleted": deleted, "length": tub.len() }))
}

/// Index list of every window of `length` contiguous records
pub fn windows(path: &Path, length: usize, config: &TubConfig, out: &mut dyn Write) -> CliResult<()> {
    let tub = open_tub(path, config)?;
    let records: Vec<Record> = tub.iter().collect::<TubResult<_>>()?;

    for window in Collator::new(length, records.iter())? {
        let indices: Vec<u64> = window.iter().map(|record| record.index()).collect();
        write_json_line(out, &json!(indices))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;
    use crate::errors::TubErrorCode;
    use crate::manifest::Metadata;
    use tempfile::TempDir;

    fn sample_tub(dir: &Path, count: u64) {
        let mut tub = Tub::create(
            dir,
            &["user/angle"],
            &["float"],
            Metadata::from(vec![("session", "track_day")]),
        )
        .unwrap();
        for i in 0..count {
            tub.write_record(&json!({"user/angle": i as f64 / 10.0})).unwrap();
        }
    }

    fn lines(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_info_summary() {
        let temp_dir = TempDir::new().unwrap();
        sample_tub(temp_dir.path(), 3);

        let mut out: Vec<u8> = Vec::new();
        info(temp_dir.path(), &TubConfig::default(), &mut out).unwrap();
        let summary = &lines(out)[0];
        assert_eq!(summary["length"], 3);
        assert_eq!(summary["current_index"], 2);
        assert_eq!(summary["inputs"], json!(["user/angle"]));
        assert_eq!(summary["types"], json!(["float"]));
        assert_eq!(summary["metadata"], json!([["session", "track_day"]]));
    }

    #[test]
    fn test_list_with_limit() {
        let temp_dir = TempDir::new().unwrap();
        sample_tub(temp_dir.path(), 5);

        let mut out: Vec<u8> = Vec::new();
        list(temp_dir.path(), Some(2), &TubConfig::default(), &mut out).unwrap();
        let records = lines(out);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["_index"], 1);
    }

    #[test]
    fn test_delete_then_windows() {
        let temp_dir = TempDir::new().unwrap();
        sample_tub(temp_dir.path(), 6);
        let config = TubConfig::default();

        let mut out: Vec<u8> = Vec::new();
        delete(temp_dir.path(), vec![2, 2, 99], &config, &mut out).unwrap();
        assert_eq!(lines(out)[0], json!({"deleted": 1, "length": 5}));

        let mut out: Vec<u8> = Vec::new();
        windows(temp_dir.path(), 2, &config, &mut out).unwrap();
        assert_eq!(
            lines(out),
            vec![json!([0, 1]), json!([3, 4]), json!([4, 5])]
        );
    }

    #[test]
    fn test_delete_last() {
        let temp_dir = TempDir::new().unwrap();
        sample_tub(temp_dir.path(), 4);

        let mut out: Vec<u8> = Vec::new();
        delete_last(temp_dir.path(), 3, &TubConfig::default(), &mut out).unwrap();
        assert_eq!(lines(out)[0], json!({"deleted": 3, "length": 1}));
    }

    #[test]
    fn test_zero_window_length_rejected() {
        let temp_dir = TempDir::new().unwrap();
        sample_tub(temp_dir.path(), 2);

        let err = windows(temp_dir.path(), 0, &TubConfig::default(), &mut Vec::<u8>::new()).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::InvalidArgument);
    }

    #[test]
    fn test_missing_tub() {
        let temp_dir = TempDir::new().unwrap();
        let err = info(temp_dir.path(), &TubConfig::default(), &mut Vec::<u8>::new()).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::Tub(TubErrorCode::NotFound));
    }

    #[test]
    fn test_load_config_default() {
        assert_eq!(load_config(None).unwrap(), TubConfig::default());
    }
}
