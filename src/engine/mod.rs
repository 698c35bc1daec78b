//! The workflow engine: phase sequencing, checkpointing, and gates.
//!
//! Phases run strictly forward; the engine never re-enters a completed phase
//! except through explicit resume. Every transition is checkpointed before
//! the engine advances, so a crash mid-phase re-executes only that phase.
use crate::state::{now_epoch_ms, Phase};
use anyhow::{anyhow, Result};

mod context;
mod ingest;
mod phases;
mod resume;

pub use context::RunContext;
pub use ingest::run_ingest;
pub use resume::resume;

/// Result of driving a run: it either advanced (possibly to terminal) or
/// halted at a review gate. Gate halts are not errors.
#[derive(Debug)]
pub enum Outcome {
    Advanced { run_id: String, phase: Phase },
    Halted { run_id: String, phase: Phase, reason: String },
}

impl Outcome {
    /// CLI contract: 0 advanced, 2 halted at a gate.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Advanced { .. } => 0,
            Outcome::Halted { .. } => 2,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Outcome::Advanced { run_id, .. } | Outcome::Halted { run_id, .. } => run_id,
        }
    }
}

/// Execute exactly one named operation, which must be the next transition
/// for the run's current phase.
pub fn run_operation(ctx: &mut RunContext, operation: &str) -> Result<Outcome> {
    let expected = match operation {
        "match" => Phase::Ingested,
        "summarize" => Phase::Matched,
        "evaluate" => Phase::Summarized,
        "publish" => Phase::Evaluated,
        other => return Err(anyhow!("unknown operation {other:?}")),
    };
    if ctx.state.phase != expected {
        return Err(anyhow!(
            "cannot {} run {} from phase {} (requires {})",
            operation,
            ctx.state.run_id,
            ctx.state.phase,
            expected
        ));
    }
    step(ctx)?;
    Ok(outcome_for(ctx))
}

/// Drive the run forward until a gate or the terminal phase.
pub fn continue_run(ctx: &mut RunContext) -> Result<Outcome> {
    loop {
        if ctx.state.phase.is_terminal() || ctx.state.phase.is_gate() {
            return Ok(outcome_for(ctx));
        }
        step(ctx)?;
    }
}

/// Execute the next phase for the current state and checkpoint the result.
fn step(ctx: &mut RunContext) -> Result<()> {
    let (operation, phase_fn): (&str, fn(&mut RunContext) -> Result<()>) = match ctx.state.phase {
        Phase::Ingested => ("match", phases::run_match),
        Phase::Matched => ("summarize", phases::run_summarize),
        Phase::Summarized => ("evaluate", phases::run_evaluate),
        Phase::Evaluated => ("publish", phases::run_publish),
        other => return Err(anyhow!("no automatic transition from phase {other}")),
    };
    let started = now_epoch_ms()?;
    match phase_fn(ctx) {
        Ok(()) => {
            ctx.checkpoint()?;
            ctx.record(operation, started, true, None)?;
            tracing::info!(
                run_id = %ctx.state.run_id,
                operation,
                phase = %ctx.state.phase,
                "phase completed"
            );
            Ok(())
        }
        Err(err) => {
            let _ = ctx.record(operation, started, false, Some(format!("{err:#}")));
            Err(err)
        }
    }
}

fn outcome_for(ctx: &RunContext) -> Outcome {
    let run_id = ctx.state.run_id.clone();
    let phase = ctx.state.phase;
    if phase.is_gate() {
        let review_path = match phase {
            Phase::AwaitingMatchReview => ctx.paths.match_review_path(),
            _ => ctx.paths.eval_review_path(),
        };
        Outcome::Halted {
            reason: format!(
                "awaiting review; edit {} then run `wrep resume --run-id {run_id}`",
                review_path.display()
            ),
            run_id,
            phase,
        }
    } else {
        Outcome::Advanced { run_id, phase }
    }
}

/// Run every phase from a fresh ingest, stopping at gates.
pub fn run_all(config: crate::config::RunConfig) -> Result<Outcome> {
    let mut ctx = run_ingest(config)?;
    continue_run(&mut ctx)
}
