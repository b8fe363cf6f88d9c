//! Export of finished evaluation logs.
//!
//! Only terminal logs are ever handed to these functions; the orchestration
//! core guarantees the log is immutable and complete for the ticks it
//! claims to cover. Two formats:
//!
//! - CSV with columns `run, tick, value, metric, trust_model, scenario`,
//!   one row per reading.
//! - Pretty-printed JSON of the whole log:
//!   `{protocol: {trust_model, scenario}, metrics, readings, seed}`.

use crate::log::EvaluationLog;
use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while writing a log to disk.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The underlying writer failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The log could not be serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write `log` as CSV, one row per reading.
pub fn write_csv<W: Write>(log: &EvaluationLog, mut writer: W) -> Result<(), ExportError> {
    writeln!(writer, "run,tick,value,metric,trust_model,scenario")?;
    for reading in log.readings() {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            log.seed(),
            reading.tick,
            reading.value,
            csv_field(reading.metric.as_str()),
            csv_field(&log.protocol().trust_model),
            csv_field(&log.protocol().scenario),
        )?;
    }
    Ok(())
}

/// Write `log` as pretty-printed JSON.
pub fn write_json<W: Write>(log: &EvaluationLog, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Save `log` as CSV into `dir` under an auto-generated name.
///
/// Returns the path of the written file.
pub fn save_csv(log: &EvaluationLog, dir: &Path) -> Result<PathBuf, ExportError> {
    let path = dir.join(auto_name(log, "csv"));
    let mut writer = BufWriter::new(File::create(&path)?);
    write_csv(log, &mut writer)?;
    writer.flush()?;
    Ok(path)
}

/// Save `log` as JSON into `dir` under an auto-generated name.
///
/// Returns the path of the written file.
pub fn save_json(log: &EvaluationLog, dir: &Path) -> Result<PathBuf, ExportError> {
    let path = dir.join(auto_name(log, "json"));
    let mut writer = BufWriter::new(File::create(&path)?);
    write_json(log, &mut writer)?;
    writer.flush()?;
    Ok(path)
}

/// `{scenario}-{trust_model}-{seed}-{timestamp}.{ext}`, scrubbed to
/// filename-safe characters.
fn auto_name(log: &EvaluationLog, ext: &str) -> String {
    let stamp = Local::now().format("%Y.%m.%d.%H%M%S");
    format!(
        "{}-{}-{}-{}.{}",
        file_part(&log.protocol().scenario),
        file_part(&log.protocol().trust_model),
        log.seed(),
        stamp,
        ext
    )
}

fn file_part(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
