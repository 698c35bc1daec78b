//! Append-only phase ledger.
//!
//! The ledger is the only place wall-clock timing is recorded, keeping
//! `state.json` free of volatile fields so checkpoints stay comparable
//! across resumes.
use super::{RunHistoryEntry, RunPaths, HISTORY_SCHEMA_VERSION};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current epoch time in milliseconds for ledger timestamps.
pub fn now_epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis())
}

/// Append a history entry as JSONL.
pub fn append_history(paths: &RunPaths, entry: &RunHistoryEntry) -> Result<()> {
    let path = paths.history_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize history entry")?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Build a ledger entry for one phase attempt.
pub fn phase_entry(
    phase: &str,
    started_at_epoch_ms: u128,
    success: bool,
    message: Option<String>,
) -> Result<RunHistoryEntry> {
    Ok(RunHistoryEntry {
        schema_version: HISTORY_SCHEMA_VERSION,
        phase: phase.to_string(),
        started_at_epoch_ms,
        finished_at_epoch_ms: now_epoch_ms()?,
        success,
        message,
    })
}
