//! Run status summary.
//!
//! Status is read-only: it loads the checkpoint without taking the run lock
//! so it works while another process is mid-phase.
use crate::state::{load_state, Phase, RunPaths, RunState};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::Path;

/// Canonical status summary emitted by `wrep status --json`.
#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub run_id: String,
    pub phase: Phase,
    pub pending_review: bool,
    pub session_count: usize,
    pub artifact_count: usize,
    pub match_count: usize,
    pub unmatched_count: usize,
    pub flag_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_command: Option<String>,
}

/// Load a run's state without locking and build its summary.
pub fn load_status(runs_root: &Path, run_id: &str) -> Result<StatusSummary> {
    let paths = RunPaths::new(runs_root, run_id);
    if !paths.state_path().is_file() {
        return Err(anyhow!(
            "no run state at {} (check --runs-root)",
            paths.state_path().display()
        ));
    }
    let state = load_state(&paths)?;
    Ok(build_status(&state))
}

/// Build the summary from a loaded state.
pub fn build_status(state: &RunState) -> StatusSummary {
    let next_command = match state.phase {
        Phase::New | Phase::Ingested => Some(format!("wrep match --run-id {}", state.run_id)),
        Phase::Matched => Some(format!("wrep summarize --run-id {}", state.run_id)),
        Phase::Summarized => Some(format!("wrep evaluate --run-id {}", state.run_id)),
        Phase::Evaluated => Some(format!("wrep publish --run-id {}", state.run_id)),
        Phase::AwaitingMatchReview | Phase::AwaitingEvalReview => {
            Some(format!("wrep resume --run-id {}", state.run_id))
        }
        Phase::Published => None,
    };
    StatusSummary {
        run_id: state.run_id.clone(),
        phase: state.phase,
        pending_review: state.pending_review,
        session_count: state.sessions.len(),
        artifact_count: state.artifacts.len(),
        match_count: state.matches.len(),
        unmatched_count: state.unmatched_artifact_ids.len(),
        flag_count: state.session_flags.len(),
        next_command,
    }
}

/// Print the human-readable form.
pub fn print_status(summary: &StatusSummary) {
    println!("run:            {}", summary.run_id);
    println!("phase:          {}", summary.phase);
    println!("pending review: {}", summary.pending_review);
    println!(
        "sessions: {}  artifacts: {}  matches: {}  unmatched: {}  flags: {}",
        summary.session_count,
        summary.artifact_count,
        summary.match_count,
        summary.unmatched_count,
        summary.flag_count
    );
    if let Some(next) = summary.next_command.as_deref() {
        println!("next:           {next}");
    }
}

/// Print the JSON form.
pub fn print_status_json(summary: &StatusSummary) -> Result<()> {
    let text = serde_json::to_string_pretty(summary).context("serialize status summary")?;
    println!("{text}");
    Ok(())
}
