//! Session roster loading.
//!
//! The roster is the authoritative session list for a run. JSON rosters are
//! parsed directly; CSV rosters tolerate the header variations real exports
//! use. A malformed roster is fatal: no meaningful run can start without one.
use crate::state::Session;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Load sessions from a roster file, sorted by id.
pub fn load_roster(path: &Path) -> Result<Vec<Session>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read roster {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let mut sessions = match extension.as_str() {
        "json" => serde_json::from_str::<Vec<Session>>(&text)
            .with_context(|| format!("parse roster {}", path.display()))?,
        "csv" => parse_csv_roster(&text)
            .with_context(|| format!("parse roster {}", path.display()))?,
        other => {
            return Err(anyhow!(
                "unsupported roster format {:?} at {} (expected .json or .csv)",
                other,
                path.display()
            ))
        }
    };
    validate_sessions(&sessions)?;
    sessions.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(sessions)
}

/// Constrain the roster to an explicit session-id filter, applied once at
/// ingest. Unknown filter ids are fatal rather than silently ignored.
pub fn filter_sessions(sessions: Vec<Session>, session_ids: &[String]) -> Result<Vec<Session>> {
    if session_ids.is_empty() {
        return Ok(sessions);
    }
    let known: BTreeSet<&str> = sessions.iter().map(|session| session.id.as_str()).collect();
    for id in session_ids {
        if !known.contains(id.as_str()) {
            return Err(anyhow!("session filter references unknown session id {id:?}"));
        }
    }
    Ok(sessions
        .into_iter()
        .filter(|session| session_ids.iter().any(|id| id == &session.id))
        .collect())
}

fn validate_sessions(sessions: &[Session]) -> Result<()> {
    if sessions.is_empty() {
        return Err(anyhow!("roster contains no sessions"));
    }
    let mut seen = BTreeSet::new();
    for session in sessions {
        if session.id.trim().is_empty() {
            return Err(anyhow!(
                "roster entry {:?} has an empty session id",
                session.title
            ));
        }
        if !seen.insert(session.id.as_str()) {
            return Err(anyhow!("roster contains duplicate session id {:?}", session.id));
        }
    }
    Ok(())
}

fn parse_csv_roster(text: &str) -> Result<Vec<Session>> {
    let mut rows = csv_rows(text);
    if rows.is_empty() {
        return Err(anyhow!("roster CSV is empty"));
    }
    let header = rows.remove(0);
    let id_col = find_column(&header, &["id", "session id", "session", "acronym"])
        .ok_or_else(|| anyhow!("roster CSV is missing an id column"))?;
    let title_col = find_column(&header, &["title", "session title", "name"]);
    let leaders_col = find_column(&header, &["leaders", "leads", "session leaders"]);
    let track_col = find_column(&header, &["track"]);
    let time_col = find_column(&header, &["scheduled_time", "time", "slot"]);

    let mut sessions = Vec::new();
    for row in rows {
        let id = cell(&row, Some(id_col));
        if id.is_empty() {
            continue;
        }
        let leaders = cell(&row, leaders_col)
            .split(';')
            .map(str::trim)
            .filter(|leader| !leader.is_empty())
            .map(str::to_string)
            .collect();
        sessions.push(Session {
            id,
            title: cell(&row, title_col),
            leaders,
            track: non_empty(cell(&row, track_col)),
            scheduled_time: non_empty(cell(&row, time_col)),
        });
    }
    Ok(sessions)
}

fn cell(row: &[String], column: Option<usize>) -> String {
    column
        .and_then(|index| row.get(index))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn find_column(header: &[String], names: &[&str]) -> Option<usize> {
    header.iter().position(|label| {
        let label = label.trim().to_ascii_lowercase();
        names.iter().any(|name| label == *name)
    })
}

/// Minimal CSV reader: comma-separated, double-quote escaping, CRLF-tolerant.
fn csv_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                if row.iter().any(|value| !value.trim().is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        if row.iter().any(|value| !value.trim().is_empty()) {
            rows.push(row);
        }
    }
    rows
}
