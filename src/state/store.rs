//! RunState checkpoint persistence.
//!
//! Every checkpoint is written via a temp file in the destination directory
//! followed by a rename, so a crash mid-write never leaves a partially
//! written `state.json` behind. Load refuses documents that fail schema
//! validation instead of attempting repair.
use super::{RunPaths, RunState, STATE_SCHEMA_VERSION};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Load and validate the persisted RunState for a run.
pub fn load_state(paths: &RunPaths) -> Result<RunState> {
    let path = paths.state_path();
    let bytes = fs::read(&path).with_context(|| format!("read state {}", path.display()))?;
    let state: RunState = serde_json::from_slice(&bytes).with_context(|| {
        format!(
            "parse run state {} (corrupted state; inspect manually, the engine never repairs it)",
            path.display()
        )
    })?;
    if state.schema_version != STATE_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported run state schema_version {} in {} (expected {})",
            state.schema_version,
            path.display(),
            STATE_SCHEMA_VERSION
        ));
    }
    Ok(state)
}

/// Checkpoint the RunState atomically. This is the recovery boundary: the
/// engine only advances after this returns.
pub fn write_state(paths: &RunPaths, state: &RunState) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(state).context("serialize run state")?;
    write_bytes_atomic(&paths.state_path(), &bytes)
}

/// Write a pretty JSON document atomically (temp file + rename).
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serialize JSON document")?;
    write_bytes_atomic(path, &bytes)
}

/// Write text atomically (temp file + rename).
pub fn write_text_atomic(path: &Path, text: &str) -> Result<()> {
    write_bytes_atomic(path, text.as_bytes())
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("no parent directory for {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("publish {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::state::Phase;
    use std::collections::BTreeMap;

    fn sample_state(root: &Path) -> (RunPaths, RunState) {
        let paths = RunPaths::new(root, "demo-1");
        let state = RunState {
            schema_version: STATE_SCHEMA_VERSION,
            run_id: "demo-1".to_string(),
            phase: Phase::Ingested,
            created_at_epoch_ms: 0,
            config: RunConfig::sample(),
            sessions: Vec::new(),
            artifacts: Vec::new(),
            matches: Vec::new(),
            unmatched_artifact_ids: Vec::new(),
            summaries: BTreeMap::new(),
            eval_results: BTreeMap::new(),
            session_flags: Vec::new(),
            pending_review: false,
        };
        (paths, state)
    }

    #[test]
    fn state_round_trips_through_checkpoint() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let (paths, state) = sample_state(temp.path());
        write_state(&paths, &state).expect("write state");
        let loaded = load_state(&paths).expect("load state");
        assert_eq!(loaded, state);
    }

    #[test]
    fn corrupted_state_refuses_to_load() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let (paths, _) = sample_state(temp.path());
        fs::create_dir_all(paths.root()).expect("create run dir");
        fs::write(paths.state_path(), b"{not json").expect("write garbage");
        let err = load_state(&paths).expect_err("should refuse");
        assert!(format!("{err:#}").contains("inspect manually"));
    }

    #[test]
    fn unknown_schema_version_refuses_to_load() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let (paths, mut state) = sample_state(temp.path());
        state.schema_version = 99;
        let bytes = serde_json::to_vec_pretty(&state).expect("serialize");
        fs::create_dir_all(paths.root()).expect("create run dir");
        fs::write(paths.state_path(), bytes).expect("write state");
        let err = load_state(&paths).expect_err("should refuse");
        assert!(format!("{err:#}").contains("schema_version"));
    }
}
