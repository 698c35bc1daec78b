//! Artifact-to-session matching.
//!
//! Tiered scoring: the highest-confidence rule wins per artifact-session
//! pair, never averaged across tiers. An artifact may legitimately match
//! several sessions (shared notes files exist), so every pair above zero is
//! retained and ties surface to the reviewer instead of being resolved here.
//! Output ordering is part of the contract: checkpoint diffing and review
//! files depend on it.
use crate::state::{Artifact, Match, MatchMethod, Session};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Matcher output: scored links plus the artifacts nothing claimed.
#[derive(Debug, PartialEq)]
pub struct MatchOutcome {
    pub matches: Vec<Match>,
    pub unmatched_artifact_ids: Vec<String>,
}

/// Match every artifact against every session.
///
/// Never errors: malformed inputs only reduce the number of matches. For the
/// same inputs the output is byte-identical, sorted by (session_id,
/// artifact_id).
pub fn match_artifacts(sessions: &[Session], artifacts: &[Artifact]) -> MatchOutcome {
    let mut matches = Vec::new();
    let mut unmatched = Vec::new();
    for artifact in artifacts {
        let name = normalize(&artifact.normalized_name);
        if name.is_empty() {
            tracing::warn!(
                artifact = %artifact.id,
                "artifact has an empty normalized name; skipping inexact tiers"
            );
            unmatched.push(artifact.id.clone());
            continue;
        }
        let mut matched = false;
        for session in sessions {
            if let Some(link) = score_pair(session, artifact, &name) {
                matches.push(link);
                matched = true;
            }
        }
        if !matched {
            unmatched.push(artifact.id.clone());
        }
    }
    matches.sort_by(|a, b| {
        (a.session_id.as_str(), a.artifact_id.as_str())
            .cmp(&(b.session_id.as_str(), b.artifact_id.as_str()))
    });
    unmatched.sort();
    MatchOutcome {
        matches,
        unmatched_artifact_ids: unmatched,
    }
}

/// Score one artifact-session pair; `name` is the pre-normalized artifact
/// name. Returns the highest tier that applies, or None.
fn score_pair(session: &Session, artifact: &Artifact, name: &str) -> Option<Match> {
    let session_id = normalize(&session.id);
    let title = normalize(&session.title);
    if session_id.is_empty() {
        return None;
    }

    let (confidence, method, rationale) = if name == session_id {
        (
            1.00,
            MatchMethod::Exact,
            "artifact name equals session id".to_string(),
        )
    } else if bracketed_tokens(&artifact.normalized_name)
        .iter()
        .any(|token| normalize(token) == session_id)
    {
        (
            0.95,
            MatchMethod::AcronymToken,
            format!("session id {:?} appears as a bracketed token", session.id),
        )
    } else if name.contains(&session_id) {
        (
            0.85,
            MatchMethod::IdInName,
            format!("session id {:?} is a substring of the artifact name", session.id),
        )
    } else if session_id.contains(name) || (!title.is_empty() && title.contains(name)) {
        (
            0.80,
            MatchMethod::NameInId,
            "artifact name is a substring of the session id or title".to_string(),
        )
    } else {
        let session_words = word_set(if title.is_empty() { &session_id } else { &title });
        if session_words.is_empty() {
            return None;
        }
        let overlap: Vec<&str> = word_set(name)
            .intersection(&session_words)
            .copied()
            .collect();
        let required = session_words.len().min(2);
        if overlap.len() < required {
            return None;
        }
        (
            0.70,
            MatchMethod::TokenOverlap,
            format!("shared words: {}", overlap.join(", ")),
        )
    };

    Some(Match {
        artifact_id: artifact.id.clone(),
        session_id: session.id.clone(),
        confidence,
        method,
        rationale,
    })
}

/// Uppercase, punctuation stripped to spaces, whitespace collapsed.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn word_set(normalized: &str) -> BTreeSet<&str> {
    normalized.split(' ').filter(|word| !word.is_empty()).collect()
}

/// Tokens inside parentheses or square brackets in the raw artifact name.
fn bracketed_tokens(raw: &str) -> Vec<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"\(([^()]*)\)|\[([^\[\]]*)\]").expect("bracket pattern"));
    pattern
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|token| token.as_str().to_string())
        .collect()
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
