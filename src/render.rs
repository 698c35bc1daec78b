//! Report rendering.
//!
//! The publisher is a read-only consumer of RunState: it renders one
//! Markdown document per session plus a roll-up, written atomically under
//! `reports/`. Output iterates sessions in roster order, so reports are as
//! deterministic as the state they came from.
use crate::state::{write_text_atomic, FlagStage, Match, RunPaths, RunState, Session};
use anyhow::Result;
use std::path::PathBuf;

/// Render and write all reports; returns the written paths.
pub fn publish_reports(paths: &RunPaths, state: &RunState) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for session in &state.sessions {
        let path = paths.session_report_path(&session.id);
        write_text_atomic(&path, &render_session_report(state, session))?;
        written.push(path);
    }
    let rollup = paths.rollup_report_path();
    write_text_atomic(&rollup, &render_rollup(state))?;
    written.push(rollup);
    Ok(written)
}

fn session_links<'a>(state: &'a RunState, session: &Session) -> Vec<&'a Match> {
    let mut links: Vec<&Match> = state
        .matches
        .iter()
        .filter(|link| link.session_id == session.id)
        .collect();
    links.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));
    links
}

fn render_session_report(state: &RunState, session: &Session) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", session.title));
    out.push_str(&format!("Session: `{}`\n", session.id));
    if !session.leaders.is_empty() {
        out.push_str(&format!("Leaders: {}\n", session.leaders.join(", ")));
    }
    if let Some(track) = session.track.as_deref() {
        out.push_str(&format!("Track: {track}\n"));
    }
    if let Some(time) = session.scheduled_time.as_deref() {
        out.push_str(&format!("Scheduled: {time}\n"));
    }

    out.push_str("\n## Summary\n\n");
    match state.summaries.get(&session.id) {
        Some(summary) => out.push_str(summary),
        None => out.push_str("_No summary was produced for this session._"),
    }
    out.push('\n');

    let links = session_links(state, session);
    out.push_str("\n## Source Materials\n\n");
    if links.is_empty() {
        out.push_str("_None matched._\n");
    } else {
        for link in links {
            out.push_str(&format!(
                "- `{}` (confidence {:.2}, {})\n",
                link.artifact_id, link.confidence, link.method
            ));
        }
    }

    let annotations = session_annotations(state, session);
    if !annotations.is_empty() {
        out.push_str("\n## Review Notes\n\n");
        for note in annotations {
            out.push_str(&format!("- {note}\n"));
        }
    }
    out
}

/// Flags and low scores surfaced in the published document, so a reviewer
/// who waved a draft through still ships the caveats with it.
fn session_annotations(state: &RunState, session: &Session) -> Vec<String> {
    let mut notes = Vec::new();
    for flag in &state.session_flags {
        if flag.session_id.as_deref() == Some(session.id.as_str())
            && matches!(flag.stage, FlagStage::Summarization | FlagStage::Evaluation)
        {
            notes.push(format!("{} ({}): {}", flag.stage, flag.code, flag.message));
        }
    }
    if let Some(result) = state.eval_results.get(&session.id) {
        for flag in &result.flags {
            notes.push(format!("evaluator flag ({}): {}", flag.code, flag.message));
        }
        let floor = state.config.qa_score_floor;
        for (name, score) in &result.scores {
            if *score < floor {
                notes.push(format!("score {name} = {score} (floor {floor})"));
            }
        }
    }
    notes
}

fn render_rollup(state: &RunState) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} - Session Reports\n\n", state.config.event_name));
    out.push_str(&format!(
        "Run `{}`: {} sessions, {} artifacts, {} matches.\n",
        state.run_id,
        state.sessions.len(),
        state.artifacts.len(),
        state.matches.len()
    ));

    out.push_str("\n## Sessions\n\n");
    for session in &state.sessions {
        let matched = session_links(state, session).len();
        let annotated = if session_annotations(state, session).is_empty() {
            ""
        } else {
            " (review notes attached)"
        };
        out.push_str(&format!(
            "- **{}** (`{}`): {} matched file(s){}\n",
            session.title, session.id, matched, annotated
        ));
    }

    if !state.unmatched_artifact_ids.is_empty() {
        out.push_str("\n## Unmatched Materials\n\n");
        for id in &state.unmatched_artifact_ids {
            out.push_str(&format!("- `{id}`\n"));
        }
    }

    let extraction_flags: Vec<_> = state
        .session_flags
        .iter()
        .filter(|flag| flag.stage == FlagStage::Extraction)
        .collect();
    if !extraction_flags.is_empty() {
        out.push_str("\n## Skipped Inputs\n\n");
        for flag in extraction_flags {
            let id = flag.artifact_id.as_deref().unwrap_or("<unknown>");
            out.push_str(&format!("- `{}`: {} ({})\n", id, flag.message, flag.code));
        }
    }
    out
}
