//! JSON line output for CLI commands
//!
//! - One JSON value per line
//! - UTF-8 only

use std::io::Write;

use serde_json::Value;

use super::errors::CliResult;

/// Write one JSON value followed by a newline
pub fn write_json_line(out: &mut dyn Write, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_one_value_per_line() {
        let mut out: Vec<u8> = Vec::new();
        write_json_line(&mut out, &json!({"a": 1})).unwrap();
        write_json_line(&mut out, &json!([2])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"a\":1}\n[2]\n");
    }
}
