//! Review gate export and import.
//!
//! A review file is a human-editable projection of RunState, exported when a
//! gate is entered and validated against the original identifiers when the
//! run resumes. Exports are canonical pretty JSON so that re-serializing an
//! unedited file is byte-identical, which makes "no changes" detectable.
use crate::state::{
    EvalFlag, FlagStage, Match, MatchMethod, RunPaths, RunState, SessionFlag,
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;

/// Current schema version for `review/match_review.json`.
pub const MATCH_REVIEW_SCHEMA_VERSION: u32 = 1;
/// Current schema version for `review/eval_review.json`.
pub const EVAL_REVIEW_SCHEMA_VERSION: u32 = 1;

/// Match review projection: every sub-threshold link, plus read-only context
/// for the entities that matched nothing.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MatchReviewFile {
    pub schema_version: u32,
    pub run_id: String,
    pub threshold: f64,
    pub entries: Vec<MatchReviewEntry>,
    pub sessions_without_matches: Vec<String>,
    pub unmatched_artifact_ids: Vec<String>,
}

/// One reviewable link. Flip `accept` to false to drop it, or append a new
/// entry for a known (artifact, session) pair to add one.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MatchReviewEntry {
    pub artifact_id: String,
    pub session_id: String,
    pub confidence: f64,
    pub method: MatchMethod,
    pub rationale: String,
    pub accept: bool,
}

/// Eval review projection: one entry per gated session.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EvalReviewFile {
    pub schema_version: u32,
    pub run_id: String,
    pub entries: Vec<EvalReviewEntry>,
}

/// One gated session. Editing `summary` replaces the stored draft; setting
/// `approved` clears the session's gate flags on merge.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EvalReviewEntry {
    pub session_id: String,
    pub approved: bool,
    pub summary: String,
    pub flags: Vec<EvalFlag>,
    pub scores: BTreeMap<String, u8>,
}

/// Build the match review projection from the current state.
pub fn build_match_review(state: &RunState) -> MatchReviewFile {
    let threshold = state.config.match_threshold;
    let entries = state
        .matches
        .iter()
        .filter(|link| link.confidence < threshold)
        .map(|link| MatchReviewEntry {
            artifact_id: link.artifact_id.clone(),
            session_id: link.session_id.clone(),
            confidence: link.confidence,
            method: link.method,
            rationale: link.rationale.clone(),
            accept: true,
        })
        .collect();
    MatchReviewFile {
        schema_version: MATCH_REVIEW_SCHEMA_VERSION,
        run_id: state.run_id.clone(),
        threshold,
        entries,
        sessions_without_matches: state.sessions_without_matches(),
        unmatched_artifact_ids: state.unmatched_artifact_ids.clone(),
    }
}

/// Export the match review file for a gate entry.
pub fn export_match_review(paths: &RunPaths, state: &RunState) -> Result<()> {
    crate::state::write_json_atomic(&paths.match_review_path(), &build_match_review(state))
}

/// Load and validate the match review file against the original state.
///
/// Returns the parsed file plus whether the on-disk bytes differ from the
/// canonical serialization (the "was it edited" signal).
pub fn import_match_review(paths: &RunPaths, state: &RunState) -> Result<(MatchReviewFile, bool)> {
    let path = paths.match_review_path();
    let bytes = fs::read(&path).with_context(|| format!("read review {}", path.display()))?;
    let review: MatchReviewFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse review {}", path.display()))?;
    if review.schema_version != MATCH_REVIEW_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported match review schema_version {}",
            review.schema_version
        ));
    }
    if review.run_id != state.run_id {
        return Err(anyhow!(
            "match review is for run {:?}, not {:?}",
            review.run_id,
            state.run_id
        ));
    }
    let session_ids: BTreeSet<&str> = state
        .sessions
        .iter()
        .map(|session| session.id.as_str())
        .collect();
    let artifact_ids: BTreeSet<&str> = state
        .artifacts
        .iter()
        .map(|artifact| artifact.id.as_str())
        .collect();
    for entry in &review.entries {
        if !session_ids.contains(entry.session_id.as_str()) {
            return Err(anyhow!(
                "match review entry ({:?}, {:?}) references unknown session id {:?}",
                entry.artifact_id,
                entry.session_id,
                entry.session_id
            ));
        }
        if !artifact_ids.contains(entry.artifact_id.as_str()) {
            return Err(anyhow!(
                "match review entry ({:?}, {:?}) references unknown artifact id {:?}",
                entry.artifact_id,
                entry.session_id,
                entry.artifact_id
            ));
        }
    }
    let canonical = serde_json::to_vec_pretty(&review).context("serialize review")?;
    let edited = canonical != bytes;
    Ok((review, edited))
}

/// Merge a validated match review into the state.
///
/// Rejected entries remove their link; entries for pairs the matcher never
/// produced are imported as human links. Accepted entries for existing links
/// are no-ops, which is what keeps the unedited round trip an identity.
pub fn apply_match_review(state: &mut RunState, review: &MatchReviewFile) {
    for entry in &review.entries {
        let existing = state.matches.iter().position(|link| {
            link.artifact_id == entry.artifact_id && link.session_id == entry.session_id
        });
        match existing {
            Some(index) if !entry.accept => {
                state.matches.remove(index);
            }
            Some(_) => {}
            None if entry.accept => {
                state.matches.push(Match {
                    artifact_id: entry.artifact_id.clone(),
                    session_id: entry.session_id.clone(),
                    confidence: entry.confidence,
                    method: MatchMethod::Review,
                    rationale: "added during match review".to_string(),
                });
            }
            None => {}
        }
    }
    state.matches.sort_by(|a, b| {
        (a.session_id.as_str(), a.artifact_id.as_str())
            .cmp(&(b.session_id.as_str(), b.artifact_id.as_str()))
    });
    state.unmatched_artifact_ids = state
        .artifacts
        .iter()
        .filter(|artifact| {
            !state
                .matches
                .iter()
                .any(|link| link.artifact_id == artifact.id)
        })
        .map(|artifact| artifact.id.clone())
        .collect();
    state.unmatched_artifact_ids.sort();
}

/// Session ids that trip the eval gate: any recorded summarize/evaluate
/// failure, any evaluator flag, or any score below the floor.
pub fn eval_gated_sessions(state: &RunState) -> Vec<String> {
    let mut gated = BTreeSet::new();
    for flag in &state.session_flags {
        if matches!(flag.stage, FlagStage::Summarization | FlagStage::Evaluation) {
            if let Some(session_id) = flag.session_id.as_deref() {
                gated.insert(session_id.to_string());
            }
        }
    }
    let floor = state.config.qa_score_floor;
    for (session_id, result) in &state.eval_results {
        if !result.flags.is_empty() || result.scores.values().any(|score| *score < floor) {
            gated.insert(session_id.clone());
        }
    }
    gated.into_iter().collect()
}

/// Build the eval review projection from the current state.
pub fn build_eval_review(state: &RunState) -> EvalReviewFile {
    let entries = eval_gated_sessions(state)
        .into_iter()
        .map(|session_id| {
            let result = state.eval_results.get(&session_id).cloned().unwrap_or_default();
            EvalReviewEntry {
                summary: state.summaries.get(&session_id).cloned().unwrap_or_default(),
                approved: false,
                flags: result.flags,
                scores: result.scores,
                session_id,
            }
        })
        .collect();
    EvalReviewFile {
        schema_version: EVAL_REVIEW_SCHEMA_VERSION,
        run_id: state.run_id.clone(),
        entries,
    }
}

/// Export the eval review file for a gate entry.
pub fn export_eval_review(paths: &RunPaths, state: &RunState) -> Result<()> {
    crate::state::write_json_atomic(&paths.eval_review_path(), &build_eval_review(state))
}

/// Load and validate the eval review file against the original state.
pub fn import_eval_review(paths: &RunPaths, state: &RunState) -> Result<(EvalReviewFile, bool)> {
    let path = paths.eval_review_path();
    let bytes = fs::read(&path).with_context(|| format!("read review {}", path.display()))?;
    let review: EvalReviewFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse review {}", path.display()))?;
    if review.schema_version != EVAL_REVIEW_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported eval review schema_version {}",
            review.schema_version
        ));
    }
    if review.run_id != state.run_id {
        return Err(anyhow!(
            "eval review is for run {:?}, not {:?}",
            review.run_id,
            state.run_id
        ));
    }
    let session_ids: BTreeSet<&str> = state
        .sessions
        .iter()
        .map(|session| session.id.as_str())
        .collect();
    for entry in &review.entries {
        if !session_ids.contains(entry.session_id.as_str()) {
            return Err(anyhow!(
                "eval review entry references unknown session id {:?}",
                entry.session_id
            ));
        }
    }
    let canonical = serde_json::to_vec_pretty(&review).context("serialize review")?;
    let edited = canonical != bytes;
    Ok((review, edited))
}

/// Merge a validated eval review into the state.
///
/// Edited summaries replace the stored drafts. Approved entries clear the
/// session's gate flags; unapproved entries keep their flags recorded, which
/// the published reports carry as annotations.
pub fn apply_eval_review(state: &mut RunState, review: &EvalReviewFile) {
    for entry in &review.entries {
        if !entry.summary.is_empty() {
            let current = state.summaries.get(&entry.session_id);
            if current.map(String::as_str) != Some(entry.summary.as_str()) {
                state
                    .summaries
                    .insert(entry.session_id.clone(), entry.summary.clone());
            }
        }
        if entry.approved {
            if let Some(result) = state.eval_results.get_mut(&entry.session_id) {
                result.flags.clear();
            }
            state.session_flags.retain(|flag: &SessionFlag| {
                flag.session_id.as_deref() != Some(entry.session_id.as_str())
                    || !matches!(flag.stage, FlagStage::Summarization | FlagStage::Evaluation)
            });
        }
    }
}

#[cfg(test)]
#[path = "review_tests.rs"]
mod tests;
