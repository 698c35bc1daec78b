//! Shared JSON schema types for run artifacts.
//!
//! These types mirror the on-disk run documents so the workflow remains
//! deterministic and schema-driven. Collections that feed checkpoints are
//! kept sorted or keyed by `BTreeMap` so serialization order never depends
//! on execution order.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::RunConfig;

/// Workflow phases. Transitions are one-directional except for explicit
/// resume out of a review gate.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    New,
    Ingested,
    Matched,
    AwaitingMatchReview,
    Summarized,
    Evaluated,
    AwaitingEvalReview,
    Published,
}

impl Phase {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::New => "new",
            Phase::Ingested => "ingested",
            Phase::Matched => "matched",
            Phase::AwaitingMatchReview => "awaiting_match_review",
            Phase::Summarized => "summarized",
            Phase::Evaluated => "evaluated",
            Phase::AwaitingEvalReview => "awaiting_eval_review",
            Phase::Published => "published",
        }
    }

    /// A gate halts automatic progress until a review is merged on resume.
    pub fn is_gate(&self) -> bool {
        matches!(self, Phase::AwaitingMatchReview | Phase::AwaitingEvalReview)
    }

    /// The run is finished; no further transitions exist.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Published)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One roster entry. Immutable once ingested for a run.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub leaders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
}

/// One extracted input file. Immutable once ingested.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub normalized_name: String,
    pub extracted_text: String,
    pub content_hash: String,
}

/// How a match was established. `Review` marks links added by a human
/// during match review rather than by the matcher.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    AcronymToken,
    IdInName,
    NameInId,
    TokenOverlap,
    Review,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::AcronymToken => "acronym_token",
            MatchMethod::IdInName => "id_in_name",
            MatchMethod::NameInId => "name_in_id",
            MatchMethod::TokenOverlap => "token_overlap",
            MatchMethod::Review => "review",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confidence-scored artifact-to-session link.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Match {
    pub artifact_id: String,
    pub session_id: String,
    pub confidence: f64,
    pub method: MatchMethod,
    pub rationale: String,
}

/// Pipeline stage that produced a recovered per-item failure.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagStage {
    Extraction,
    Summarization,
    Evaluation,
}

impl FlagStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagStage::Extraction => "extraction",
            FlagStage::Summarization => "summarization",
            FlagStage::Evaluation => "evaluation",
        }
    }
}

impl fmt::Display for FlagStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record of a per-item failure captured inside RunState instead
/// of aborting the phase.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionFlag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    pub stage: FlagStage,
    pub code: String,
    pub message: String,
}

/// One issue raised by the evaluator against a draft summary.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EvalFlag {
    pub code: String,
    pub message: String,
}

/// Evaluator output for one session.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct EvalResult {
    #[serde(default)]
    pub scores: BTreeMap<String, u8>,
    #[serde(default)]
    pub flags: Vec<EvalFlag>,
}

/// The single source of truth for a run.
///
/// Owned exclusively by the workflow engine, mutated only between phase
/// boundaries, and checkpointed after every transition. Wall-clock timing
/// lives in `history.jsonl`; keeping it out of this document is what makes
/// resume-idempotence byte-comparable.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunState {
    pub schema_version: u32,
    pub run_id: String,
    pub phase: Phase,
    pub created_at_epoch_ms: u128,
    pub config: RunConfig,
    pub sessions: Vec<Session>,
    pub artifacts: Vec<Artifact>,
    pub matches: Vec<Match>,
    pub unmatched_artifact_ids: Vec<String>,
    pub summaries: BTreeMap<String, String>,
    pub eval_results: BTreeMap<String, EvalResult>,
    pub session_flags: Vec<SessionFlag>,
    pub pending_review: bool,
}

impl RunState {
    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|artifact| artifact.id == id)
    }

    /// Session ids with no match at all, sorted for stable reporting.
    pub fn sessions_without_matches(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|session| {
                !self
                    .matches
                    .iter()
                    .any(|link| link.session_id == session.id)
            })
            .map(|session| session.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// History entry appended after each phase attempt.
#[derive(Debug, Serialize)]
pub struct RunHistoryEntry {
    pub schema_version: u32,
    pub phase: String,
    pub started_at_epoch_ms: u128,
    pub finished_at_epoch_ms: u128,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
