//! Resume-from-checkpoint, including review-gate merges.
//!
//! Resuming a gate first validates and merges the review file; resuming any
//! other phase simply continues from the last checkpoint, re-executing only
//! the phase whose write never landed.
use super::{continue_run, Outcome, RunContext};
use crate::review;
use crate::state::{now_epoch_ms, Phase};
use anyhow::Result;
use std::path::Path;

/// Resume a run from its last persisted state.
pub fn resume(runs_root: &Path, run_id: &str) -> Result<Outcome> {
    let mut ctx = RunContext::load(runs_root, run_id)?;
    let started = now_epoch_ms()?;
    match ctx.state.phase {
        Phase::AwaitingMatchReview => {
            let review_path = ctx.paths.match_review_path();
            if !review_path.is_file() {
                return Ok(Outcome::Halted {
                    run_id: ctx.state.run_id.clone(),
                    phase: ctx.state.phase,
                    reason: format!(
                        "no match review at {}; supply the review first",
                        review_path.display()
                    ),
                });
            }
            let (file, edited) = review::import_match_review(&ctx.paths, &ctx.state)?;
            review::apply_match_review(&mut ctx.state, &file);
            ctx.state.phase = Phase::Matched;
            ctx.state.pending_review = false;
            ctx.checkpoint()?;
            ctx.record(
                "resume",
                started,
                true,
                Some(if edited {
                    "merged edited match review".to_string()
                } else {
                    "accepted unedited match review".to_string()
                }),
            )?;
        }
        Phase::AwaitingEvalReview => {
            let review_path = ctx.paths.eval_review_path();
            if !review_path.is_file() {
                return Ok(Outcome::Halted {
                    run_id: ctx.state.run_id.clone(),
                    phase: ctx.state.phase,
                    reason: format!(
                        "no eval review at {}; supply the review first",
                        review_path.display()
                    ),
                });
            }
            let (file, edited) = review::import_eval_review(&ctx.paths, &ctx.state)?;
            review::apply_eval_review(&mut ctx.state, &file);
            ctx.state.phase = Phase::Evaluated;
            ctx.state.pending_review = false;
            ctx.checkpoint()?;
            ctx.record(
                "resume",
                started,
                true,
                Some(if edited {
                    "merged edited eval review".to_string()
                } else {
                    "accepted unedited eval review".to_string()
                }),
            )?;
        }
        Phase::Published => {
            return Ok(Outcome::Advanced {
                run_id: ctx.state.run_id.clone(),
                phase: Phase::Published,
            })
        }
        _ => {}
    }
    continue_run(&mut ctx)
}
