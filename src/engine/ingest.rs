//! Ingest: roster + artifacts in, a new locked run out.
//!
//! A malformed roster or config fails here, before any run directory is
//! created. Request-level session filtering is applied exactly once, at
//! ingest, by constraining the initial session set.
use super::RunContext;
use crate::artifacts::ingest_artifacts;
use crate::config::RunConfig;
use crate::roster::{filter_sessions, load_roster};
use crate::state::{
    acquire, now_epoch_ms, write_state, Phase, RunPaths, RunState, STATE_SCHEMA_VERSION,
};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Create a run from a validated config. Returns the locked context so
/// `wrep run` can keep going without re-acquiring.
pub fn run_ingest(config: RunConfig) -> Result<RunContext> {
    let started = now_epoch_ms()?;
    let sessions = load_roster(Path::new(&config.roster_path))?;
    let sessions = filter_sessions(sessions, &config.session_ids)?;
    let ingested = ingest_artifacts(Path::new(&config.artifacts_dir))?;

    let run_id = new_run_id(&config.event_name, started);
    let paths = RunPaths::new(Path::new(&config.runs_root), &run_id);
    if paths.root().exists() {
        return Err(anyhow!(
            "run directory {} already exists",
            paths.root().display()
        ));
    }
    fs::create_dir_all(paths.root())
        .with_context(|| format!("create {}", paths.root().display()))?;
    let lock = acquire(&paths)?;

    let mut state = RunState {
        schema_version: STATE_SCHEMA_VERSION,
        run_id: run_id.clone(),
        phase: Phase::New,
        created_at_epoch_ms: started,
        config,
        sessions,
        artifacts: ingested.artifacts,
        matches: Vec::new(),
        unmatched_artifact_ids: Vec::new(),
        summaries: BTreeMap::new(),
        eval_results: BTreeMap::new(),
        session_flags: ingested.flags,
        pending_review: false,
    };
    state.phase = Phase::Ingested;
    write_state(&paths, &state)?;

    let ctx = RunContext::new(paths, state, lock);
    ctx.record("ingest", started, true, None)?;
    tracing::info!(
        run_id = %ctx.state.run_id,
        sessions = ctx.state.sessions.len(),
        artifacts = ctx.state.artifacts.len(),
        "run ingested"
    );
    Ok(ctx)
}

/// Run ids are a slug of the event name plus the creation timestamp, which
/// keeps directory listings readable and collision-free in practice.
fn new_run_id(event_name: &str, started_at_epoch_ms: u128) -> String {
    let slug: String = event_name
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    let slug = if slug.is_empty() {
        "run".to_string()
    } else {
        slug
    };
    format!("{slug}-{started_at_epoch_ms}")
}
