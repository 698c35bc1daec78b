use super::*;
use crate::config::RunConfig;
use crate::state::{
    Artifact, EvalResult, Match, MatchMethod, Phase, RunState, Session, STATE_SCHEMA_VERSION,
};
use std::collections::BTreeMap;

fn state_with_matches() -> RunState {
    RunState {
        schema_version: STATE_SCHEMA_VERSION,
        run_id: "demo-1".to_string(),
        phase: Phase::AwaitingMatchReview,
        created_at_epoch_ms: 0,
        config: RunConfig::sample(),
        sessions: vec![
            Session {
                id: "dwarf".to_string(),
                title: "Debugging Formats".to_string(),
                leaders: Vec::new(),
                track: None,
                scheduled_time: None,
            },
            Session {
                id: "mape".to_string(),
                title: "Performance Evaluation".to_string(),
                leaders: Vec::new(),
                track: None,
                scheduled_time: None,
            },
        ],
        artifacts: vec![
            Artifact {
                id: "dwarf_notes.md".to_string(),
                normalized_name: "dwarf_notes".to_string(),
                extracted_text: "notes".to_string(),
                content_hash: "0".repeat(64),
            },
            Artifact {
                id: "random_notes.md".to_string(),
                normalized_name: "random_notes".to_string(),
                extracted_text: "noise".to_string(),
                content_hash: "1".repeat(64),
            },
        ],
        matches: vec![Match {
            artifact_id: "dwarf_notes.md".to_string(),
            session_id: "dwarf".to_string(),
            confidence: 0.85,
            method: MatchMethod::IdInName,
            rationale: "substring".to_string(),
        }],
        unmatched_artifact_ids: vec!["random_notes.md".to_string()],
        summaries: BTreeMap::new(),
        eval_results: BTreeMap::new(),
        session_flags: Vec::new(),
        pending_review: true,
    }
}

#[test]
fn unedited_export_round_trips_byte_identically() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let paths = crate::state::RunPaths::new(temp.path(), "demo-1");
    let state = state_with_matches();
    export_match_review(&paths, &state).expect("export");
    let (review, edited) = import_match_review(&paths, &state).expect("import");
    assert!(!edited);
    assert_eq!(review, build_match_review(&state));
}

#[test]
fn unedited_merge_leaves_matches_unchanged() {
    let mut state = state_with_matches();
    let before = state.matches.clone();
    let review = build_match_review(&state);
    apply_match_review(&mut state, &review);
    assert_eq!(state.matches, before);
    assert_eq!(state.unmatched_artifact_ids, vec!["random_notes.md"]);
}

#[test]
fn unknown_session_id_is_rejected_by_name() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let paths = crate::state::RunPaths::new(temp.path(), "demo-1");
    let state = state_with_matches();
    let mut review = build_match_review(&state);
    review.entries.push(MatchReviewEntry {
        artifact_id: "dwarf_notes.md".to_string(),
        session_id: "ghost".to_string(),
        confidence: 1.0,
        method: MatchMethod::Review,
        rationale: String::new(),
        accept: true,
    });
    crate::state::write_json_atomic(&paths.match_review_path(), &review).expect("write");
    let err = import_match_review(&paths, &state).expect_err("should reject");
    assert!(format!("{err:#}").contains("ghost"));
}

#[test]
fn rejected_entry_removes_the_link() {
    let mut state = state_with_matches();
    // Drop the threshold so the existing 0.85 link lands in the review file.
    state.config.match_threshold = 0.90;
    let mut review = build_match_review(&state);
    assert_eq!(review.entries.len(), 1);
    review.entries[0].accept = false;
    apply_match_review(&mut state, &review);
    assert!(state.matches.is_empty());
    assert_eq!(
        state.unmatched_artifact_ids,
        vec!["dwarf_notes.md", "random_notes.md"]
    );
}

#[test]
fn human_added_pair_is_imported_as_review_link() {
    let mut state = state_with_matches();
    let mut review = build_match_review(&state);
    review.entries.push(MatchReviewEntry {
        artifact_id: "random_notes.md".to_string(),
        session_id: "mape".to_string(),
        confidence: 1.0,
        method: MatchMethod::Review,
        rationale: String::new(),
        accept: true,
    });
    apply_match_review(&mut state, &review);
    assert_eq!(state.matches.len(), 2);
    let added = state
        .matches
        .iter()
        .find(|link| link.session_id == "mape")
        .expect("added link");
    assert_eq!(added.method, MatchMethod::Review);
    assert!(state.unmatched_artifact_ids.is_empty());
}

#[test]
fn eval_gate_collects_flags_and_low_scores() {
    let mut state = state_with_matches();
    state.summaries.insert("dwarf".to_string(), "draft".to_string());
    state.summaries.insert("mape".to_string(), "draft".to_string());
    state.eval_results.insert(
        "dwarf".to_string(),
        EvalResult {
            scores: BTreeMap::from([("accuracy".to_string(), 2)]),
            flags: Vec::new(),
        },
    );
    state.eval_results.insert(
        "mape".to_string(),
        EvalResult {
            scores: BTreeMap::from([("accuracy".to_string(), 5)]),
            flags: Vec::new(),
        },
    );
    assert_eq!(eval_gated_sessions(&state), vec!["dwarf"]);
}

#[test]
fn approving_an_eval_entry_clears_its_flags() {
    let mut state = state_with_matches();
    state.summaries.insert("dwarf".to_string(), "draft".to_string());
    state.eval_results.insert(
        "dwarf".to_string(),
        EvalResult {
            scores: BTreeMap::new(),
            flags: vec![EvalFlag {
                code: "unknown_person".to_string(),
                message: "who is this".to_string(),
            }],
        },
    );
    let mut review = build_eval_review(&state);
    assert_eq!(review.entries.len(), 1);
    review.entries[0].approved = true;
    review.entries[0].summary = "edited draft".to_string();
    apply_eval_review(&mut state, &review);
    assert_eq!(state.summaries.get("dwarf").map(String::as_str), Some("edited draft"));
    assert!(state.eval_results.get("dwarf").expect("result").flags.is_empty());
    assert!(eval_gated_sessions(&state).is_empty());
}
