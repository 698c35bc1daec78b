use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod artifacts;
mod cli;
mod config;
mod engine;
mod llm;
mod matcher;
mod pool;
mod render;
mod review;
mod roster;
mod state;
mod status;

use cli::{Command, RootArgs};
use engine::Outcome;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = RootArgs::parse();
    match dispatch(args) {
        Ok(outcome) => {
            report_outcome(&outcome);
            ExitCode::from(outcome.exit_code())
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn dispatch(args: RootArgs) -> Result<Outcome> {
    match args.command {
        Command::Ingest(cmd) => {
            let config = config::load_config(&cmd.config)?;
            let ctx = engine::run_ingest(config)?;
            println!("{}", ctx.state.run_id);
            Ok(Outcome::Advanced {
                run_id: ctx.state.run_id.clone(),
                phase: ctx.state.phase,
            })
        }
        Command::Match(cmd) => run_single(&cmd, "match"),
        Command::Summarize(cmd) => run_single(&cmd, "summarize"),
        Command::Evaluate(cmd) => run_single(&cmd, "evaluate"),
        Command::Publish(cmd) => run_single(&cmd, "publish"),
        Command::Run(cmd) => {
            let config = config::load_config(&cmd.config)?;
            let outcome = engine::run_all(config)?;
            println!("{}", outcome.run_id());
            Ok(outcome)
        }
        Command::Resume(cmd) => engine::resume(&cmd.runs_root, &cmd.run_id),
        Command::Status(cmd) => {
            let summary = status::load_status(&cmd.runs_root, &cmd.run_id)?;
            if cmd.json {
                status::print_status_json(&summary)?;
            } else {
                status::print_status(&summary);
            }
            Ok(Outcome::Advanced {
                run_id: summary.run_id,
                phase: summary.phase,
            })
        }
    }
}

fn run_single(cmd: &cli::RunArgs, operation: &str) -> Result<Outcome> {
    let mut ctx = engine::RunContext::load(&cmd.runs_root, &cmd.run_id)?;
    engine::run_operation(&mut ctx, operation)
}

fn report_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Advanced { run_id, phase } => {
            eprintln!("run {run_id}: phase {phase}");
        }
        Outcome::Halted {
            run_id,
            phase,
            reason,
        } => {
            eprintln!("run {run_id}: halted at {phase}; {reason}");
        }
    }
}
