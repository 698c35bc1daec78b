//! Loaded run context shared by phase functions.
//!
//! Holding the advisory lock for the lifetime of the context is what makes
//! "one process per run" hold across load, mutate, and checkpoint.
use crate::state::{
    self, acquire, load_state, phase_entry, write_state, RunLock, RunPaths, RunState,
};
use anyhow::{anyhow, Result};
use std::path::Path;

/// A locked, loaded run. Phase functions mutate `state` and the engine
/// checkpoints it between phase boundaries.
pub struct RunContext {
    pub paths: RunPaths,
    pub state: RunState,
    _lock: RunLock,
}

impl RunContext {
    /// Acquire the run lock, then load and validate the checkpoint.
    pub fn load(runs_root: &Path, run_id: &str) -> Result<Self> {
        let paths = RunPaths::new(runs_root, run_id);
        if !paths.state_path().is_file() {
            return Err(anyhow!(
                "no run state at {} (run `wrep ingest` or check --runs-root)",
                paths.state_path().display()
            ));
        }
        let lock = acquire(&paths)?;
        let state = load_state(&paths)?;
        if state.run_id != run_id {
            return Err(anyhow!(
                "run state at {} belongs to run {:?}, not {:?}",
                paths.state_path().display(),
                state.run_id,
                run_id
            ));
        }
        Ok(Self {
            paths,
            state,
            _lock: lock,
        })
    }

    /// Wrap an already-locked, freshly created run (used by ingest).
    pub fn new(paths: RunPaths, state: RunState, lock: RunLock) -> Self {
        Self {
            paths,
            state,
            _lock: lock,
        }
    }

    /// Checkpoint the current state. This is the recovery boundary.
    pub fn checkpoint(&self) -> Result<()> {
        write_state(&self.paths, &self.state)
    }

    /// Append a ledger entry for one operation attempt.
    pub fn record(
        &self,
        operation: &str,
        started_at_epoch_ms: u128,
        success: bool,
        message: Option<String>,
    ) -> Result<()> {
        let entry = phase_entry(operation, started_at_epoch_ms, success, message)?;
        state::append_history(&self.paths, &entry)
    }
}
