//! Phase functions.
//!
//! Each function takes the loaded context, rewrites the state for exactly one
//! transition, and leaves checkpointing to the engine loop. All of them are
//! idempotent against their own partial output: re-running a phase whose
//! checkpoint write never landed reproduces the same state.
use super::RunContext;
use crate::llm;
use crate::matcher::match_artifacts;
use crate::pool::map_bounded;
use crate::render::publish_reports;
use crate::review;
use crate::state::{FlagStage, EvalResult, Match, Phase, Session, SessionFlag};
use anyhow::Result;

/// Summary stored when a session has no matched materials at all; calling
/// the summarizer with nothing to summarize only invites hallucination.
pub const NO_MATERIALS_SUMMARY: &str =
    "_No matched materials were available for this session._";

/// INGESTED -> MATCHED, or AWAITING_MATCH_REVIEW when anything needs a human.
pub fn run_match(ctx: &mut RunContext) -> Result<()> {
    let outcome = match_artifacts(&ctx.state.sessions, &ctx.state.artifacts);
    ctx.state.matches = outcome.matches;
    ctx.state.unmatched_artifact_ids = outcome.unmatched_artifact_ids;

    let threshold = ctx.state.config.match_threshold;
    let sub_threshold = ctx
        .state
        .matches
        .iter()
        .any(|link| link.confidence < threshold);
    let sessions_without = ctx.state.sessions_without_matches();
    let needs_review = sub_threshold
        || !ctx.state.unmatched_artifact_ids.is_empty()
        || !sessions_without.is_empty();

    if needs_review {
        ctx.state.phase = Phase::AwaitingMatchReview;
        ctx.state.pending_review = true;
        review::export_match_review(&ctx.paths, &ctx.state)?;
        tracing::info!(
            run_id = %ctx.state.run_id,
            sub_threshold,
            unmatched = ctx.state.unmatched_artifact_ids.len(),
            sessions_without_matches = sessions_without.len(),
            "match phase halted for review"
        );
    } else {
        ctx.state.phase = Phase::Matched;
        ctx.state.pending_review = false;
    }
    Ok(())
}

/// MATCHED -> SUMMARIZED. One failed session flags that session only.
pub fn run_summarize(ctx: &mut RunContext) -> Result<()> {
    llm::check_command_available(&ctx.state.config.summarizer, "summarizer")?;

    // Re-attempted sessions shed their previous failure flags first so a
    // resume cannot accumulate duplicates.
    let done: Vec<String> = ctx.state.summaries.keys().cloned().collect();
    ctx.state.session_flags.retain(|flag| {
        flag.stage != FlagStage::Summarization
            || flag
                .session_id
                .as_deref()
                .is_some_and(|id| done.iter().any(|d| d.as_str() == id))
    });

    let jobs: Vec<(String, Option<String>)> = ctx
        .state
        .sessions
        .iter()
        .filter(|session| !ctx.state.summaries.contains_key(&session.id))
        .map(|session| {
            let prompt = build_summary_prompt(ctx, session);
            (session.id.clone(), prompt)
        })
        .collect();

    let endpoint = ctx.state.config.summarizer.clone();
    let workers = ctx.state.config.workers;
    let results = map_bounded(&jobs, workers, |_, (session_id, prompt)| match prompt {
        None => (session_id.clone(), Ok(NO_MATERIALS_SUMMARY.to_string())),
        Some(prompt) => (
            session_id.clone(),
            llm::complete(&endpoint, "summarizer", prompt),
        ),
    });

    for (session_id, result) in results {
        match result {
            Ok(text) => {
                ctx.state
                    .summaries
                    .insert(session_id, text.trim().to_string());
            }
            Err(err) => {
                tracing::warn!(session = %session_id, "summarization failed: {err:#}");
                ctx.state.session_flags.push(SessionFlag {
                    session_id: Some(session_id),
                    artifact_id: None,
                    stage: FlagStage::Summarization,
                    code: "summarize_failed".to_string(),
                    message: format!("{err:#}"),
                });
            }
        }
    }
    ctx.state.phase = Phase::Summarized;
    Ok(())
}

/// SUMMARIZED -> EVALUATED, or AWAITING_EVAL_REVIEW when anything is flagged
/// or scored below the floor.
pub fn run_evaluate(ctx: &mut RunContext) -> Result<()> {
    llm::check_command_available(&ctx.state.config.evaluator, "evaluator")?;

    let done: Vec<String> = ctx.state.eval_results.keys().cloned().collect();
    ctx.state.session_flags.retain(|flag| {
        flag.stage != FlagStage::Evaluation
            || flag
                .session_id
                .as_deref()
                .is_some_and(|id| done.iter().any(|d| d.as_str() == id))
    });

    // Sessions whose summarization failed carry their flag already; there is
    // no draft to evaluate.
    let jobs: Vec<(String, String)> = ctx
        .state
        .sessions
        .iter()
        .filter(|session| {
            ctx.state.summaries.contains_key(&session.id)
                && !ctx.state.eval_results.contains_key(&session.id)
        })
        .map(|session| (session.id.clone(), build_eval_prompt(ctx, session)))
        .collect();

    let endpoint = ctx.state.config.evaluator.clone();
    let workers = ctx.state.config.workers;
    let results = map_bounded(&jobs, workers, |_, (session_id, prompt)| {
        (
            session_id.clone(),
            llm::complete(&endpoint, "evaluator", prompt),
        )
    });

    for (session_id, result) in results {
        match result {
            Ok(text) => match parse_eval_response(&text) {
                Ok(eval) => {
                    ctx.state.eval_results.insert(session_id, eval);
                }
                Err(err) => {
                    tracing::warn!(session = %session_id, "evaluator output unparseable: {err:#}");
                    ctx.state.session_flags.push(SessionFlag {
                        session_id: Some(session_id),
                        artifact_id: None,
                        stage: FlagStage::Evaluation,
                        code: "eval_parse_error".to_string(),
                        message: format!("{err:#}"),
                    });
                }
            },
            Err(err) => {
                tracing::warn!(session = %session_id, "evaluation failed: {err:#}");
                ctx.state.session_flags.push(SessionFlag {
                    session_id: Some(session_id),
                    artifact_id: None,
                    stage: FlagStage::Evaluation,
                    code: "evaluate_failed".to_string(),
                    message: format!("{err:#}"),
                });
            }
        }
    }

    let gated = review::eval_gated_sessions(&ctx.state);
    if gated.is_empty() {
        ctx.state.phase = Phase::Evaluated;
        ctx.state.pending_review = false;
    } else {
        ctx.state.phase = Phase::AwaitingEvalReview;
        ctx.state.pending_review = true;
        review::export_eval_review(&ctx.paths, &ctx.state)?;
        tracing::info!(
            run_id = %ctx.state.run_id,
            gated = gated.len(),
            "evaluate phase halted for review"
        );
    }
    Ok(())
}

/// EVALUATED -> PUBLISHED. The renderer reads RunState; it never writes it.
pub fn run_publish(ctx: &mut RunContext) -> Result<()> {
    let written = publish_reports(&ctx.paths, &ctx.state)?;
    tracing::info!(
        run_id = %ctx.state.run_id,
        reports = written.len(),
        "reports published"
    );
    ctx.state.phase = Phase::Published;
    Ok(())
}

/// Build the summarizer prompt for one session, or None when no materials
/// matched. Matched texts are ordered by artifact id so the prompt (and with
/// it the call) is deterministic.
fn build_summary_prompt(ctx: &RunContext, session: &Session) -> Option<String> {
    let mut links: Vec<&Match> = ctx
        .state
        .matches
        .iter()
        .filter(|link| link.session_id == session.id)
        .collect();
    if links.is_empty() {
        return None;
    }
    links.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));

    let mut prompt = String::new();
    prompt.push_str("You are writing one section of a workshop report.\n\n# Session\n");
    prompt.push_str(&format!("id: {}\ntitle: {}\n", session.id, session.title));
    if !session.leaders.is_empty() {
        prompt.push_str(&format!("leaders: {}\n", session.leaders.join(", ")));
    }
    if let Some(track) = session.track.as_deref() {
        prompt.push_str(&format!("track: {track}\n"));
    }
    prompt.push_str("\n# Materials\n");
    for link in links {
        if let Some(artifact) = ctx.state.artifact(&link.artifact_id) {
            prompt.push_str(&format!(
                "\n## {} (confidence {:.2}, {})\n{}\n",
                artifact.id, link.confidence, link.method, artifact.extracted_text
            ));
        }
    }
    prompt.push_str(
        "\n# Instructions\nWrite a concise, factual summary of this session using only the \
         materials above. Name people and organizations only when the materials name them. \
         Respond with Markdown prose, no front matter.\n",
    );
    Some(prompt)
}

/// Build the evaluator prompt: draft plus ground-truth materials, asking for
/// a strict JSON verdict.
fn build_eval_prompt(ctx: &RunContext, session: &Session) -> String {
    let summary = ctx
        .state
        .summaries
        .get(&session.id)
        .map(String::as_str)
        .unwrap_or_default();
    let mut prompt = String::new();
    prompt.push_str("You are checking a draft report section against its source data.\n\n");
    prompt.push_str("# Source Data (Ground Truth)\n");
    prompt.push_str(&format!("session: {} ({})\n", session.title, session.id));
    let mut links: Vec<&Match> = ctx
        .state
        .matches
        .iter()
        .filter(|link| link.session_id == session.id)
        .collect();
    links.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));
    for link in links {
        if let Some(artifact) = ctx.state.artifact(&link.artifact_id) {
            prompt.push_str(&format!("\n## {}\n{}\n", artifact.id, artifact.extracted_text));
        }
    }
    prompt.push_str("\n# Draft To Verify\n");
    prompt.push_str(summary);
    prompt.push_str(
        "\n\n# Instructions\nScore the draft from 1 to 5 for accuracy and coverage, and flag \
         every claim the source data does not support. Respond with a single JSON object, no \
         prose: {\"scores\": {\"accuracy\": 1-5, \"coverage\": 1-5}, \"flags\": [{\"code\": \
         \"...\", \"message\": \"...\"}]}\n",
    );
    prompt
}

/// Parse evaluator output, tolerating Markdown code fences.
fn parse_eval_response(text: &str) -> Result<EvalResult> {
    let json = llm::extract_json(text);
    let eval: EvalResult = serde_json::from_str(json)?;
    Ok(eval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_response_parses_with_fences() {
        let text = "```json\n{\"scores\": {\"accuracy\": 4}, \"flags\": []}\n```";
        let eval = parse_eval_response(text).expect("parse");
        assert_eq!(eval.scores.get("accuracy"), Some(&4));
        assert!(eval.flags.is_empty());
    }

    #[test]
    fn eval_response_defaults_missing_fields() {
        let eval = parse_eval_response("{}").expect("parse");
        assert!(eval.scores.is_empty());
        assert!(eval.flags.is_empty());
    }
}
