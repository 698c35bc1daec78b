//! Typed paths into a run directory.
//!
//! Centralizing path construction keeps file access consistent across the
//! workflow and prevents drift when the layout evolves.
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating per-run artifacts under the runs root.
#[derive(Debug, Clone)]
pub struct RunPaths {
    root: PathBuf,
}

impl RunPaths {
    /// Create a path helper for one run under the runs root.
    pub fn new(runs_root: &Path, run_id: &str) -> Self {
        Self {
            root: runs_root.join(run_id),
        }
    }

    /// Return the run directory used for path derivation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `state.json` checkpoint path.
    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// Return the `run.lock` advisory lock path.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join("run.lock")
    }

    /// Return the `history.jsonl` ledger path.
    pub fn history_path(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    /// Return the `review/` directory path.
    pub fn review_dir(&self) -> PathBuf {
        self.root.join("review")
    }

    /// Return the `review/match_review.json` path.
    pub fn match_review_path(&self) -> PathBuf {
        self.review_dir().join("match_review.json")
    }

    /// Return the `review/eval_review.json` path.
    pub fn eval_review_path(&self) -> PathBuf {
        self.review_dir().join("eval_review.json")
    }

    /// Return the `reports/` directory path.
    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Return the per-session report path for a session id.
    pub fn session_report_path(&self, session_id: &str) -> PathBuf {
        self.reports_dir()
            .join(format!("{}.md", file_safe(session_id)))
    }

    /// Return the roll-up `reports/report.md` path.
    pub fn rollup_report_path(&self) -> PathBuf {
        self.reports_dir().join("report.md")
    }
}

/// Map an identifier onto a safe file-name component.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
