//! CLI argument parsing for the reporting workflow.
//!
//! The CLI is intentionally thin: it wires a deterministic loop without
//! embedding policy, so the same engine can be driven one phase at a time or
//! end to end.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the reporting workflow.
#[derive(Parser, Debug)]
#[command(
    name = "wrep",
    version,
    about = "Review-gated workshop report pipeline",
    after_help = "Commands:\n  ingest --config <file>     Create a run from a roster + materials dir (prints run id)\n  match --run-id <id>        Match artifacts to sessions (halts for review when unsure)\n  summarize --run-id <id>    Draft per-session summaries\n  evaluate --run-id <id>     Check drafts against sources (halts for review on flags)\n  publish --run-id <id>      Render final reports\n  run --config <file>        All phases, stopping at review gates\n  resume --run-id <id>       Merge review edits and continue\n  status --run-id <id>       Show phase and pending-review state\n\nExit codes: 0 advanced, 2 halted at a review gate, 1 fatal error.",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Ingest(ConfigArgs),
    Match(RunArgs),
    Summarize(RunArgs),
    Evaluate(RunArgs),
    Publish(RunArgs),
    Run(ConfigArgs),
    Resume(RunArgs),
    Status(StatusArgs),
}

/// Commands that start from a config file.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Path to the run config JSON
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,
}

/// Commands keyed by an existing run.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Run identifier printed by `wrep ingest`
    #[arg(long, value_name = "ID")]
    pub run_id: String,

    /// Directory holding per-run state (must match the ingest config)
    #[arg(long, value_name = "DIR", default_value = "runs")]
    pub runs_root: PathBuf,
}

/// Status command inputs.
#[derive(Parser, Debug)]
#[command(about = "Show run phase and pending-review state")]
pub struct StatusArgs {
    /// Run identifier printed by `wrep ingest`
    #[arg(long, value_name = "ID")]
    pub run_id: String,

    /// Directory holding per-run state (must match the ingest config)
    #[arg(long, value_name = "DIR", default_value = "runs")]
    pub runs_root: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
