//! Run configuration loading and validation.
//!
//! The config is a strongly-typed JSON document rejected at load time on
//! unknown fields or out-of-range values, so a bad config fails before a run
//! is created rather than inside a later phase.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current schema version for run config files.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

const DEFAULT_MATCH_THRESHOLD: f64 = 0.70;
const DEFAULT_QA_SCORE_FLOOR: u8 = 3;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_MAX_RETRIES: u32 = 2;

fn default_runs_root() -> String {
    "runs".to_string()
}

fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_qa_score_floor() -> u8 {
    DEFAULT_QA_SCORE_FLOOR
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Top-level run configuration. Immutable startup input; a validated copy is
/// embedded in RunState at ingest so later phases never re-read the file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub schema_version: u32,
    pub event_name: String,
    pub roster_path: String,
    pub artifacts_dir: String,
    #[serde(default = "default_runs_root")]
    pub runs_root: String,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_qa_score_floor")]
    pub qa_score_floor: u8,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub session_ids: Vec<String>,
    pub summarizer: LmEndpoint,
    pub evaluator: LmEndpoint,
}

/// One external model endpoint: either a subprocess command (prompt on
/// stdin, text on stdout) or an OpenAI-compatible HTTP endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LmEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<HttpEndpoint>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// OpenAI-compatible chat-completions endpoint settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HttpEndpoint {
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Load and validate a run config from disk.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: RunConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate config schema and value ranges.
pub fn validate_config(config: &RunConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {} (expected {})",
            config.schema_version,
            CONFIG_SCHEMA_VERSION
        ));
    }
    if config.event_name.trim().is_empty() {
        return Err(anyhow!("event_name must be non-empty"));
    }
    if config.roster_path.trim().is_empty() {
        return Err(anyhow!("roster_path must be non-empty"));
    }
    if config.artifacts_dir.trim().is_empty() {
        return Err(anyhow!("artifacts_dir must be non-empty"));
    }
    if !(0.0..=1.0).contains(&config.match_threshold) {
        return Err(anyhow!(
            "match_threshold must be within [0, 1] (got {})",
            config.match_threshold
        ));
    }
    if !(1..=5).contains(&config.qa_score_floor) {
        return Err(anyhow!(
            "qa_score_floor must be within [1, 5] (got {})",
            config.qa_score_floor
        ));
    }
    if config.workers == 0 {
        return Err(anyhow!("workers must be at least 1"));
    }
    validate_endpoint(&config.summarizer, "summarizer")?;
    validate_endpoint(&config.evaluator, "evaluator")?;
    Ok(())
}

fn validate_endpoint(endpoint: &LmEndpoint, label: &str) -> Result<()> {
    match (&endpoint.command, &endpoint.endpoint) {
        (Some(_), Some(_)) => Err(anyhow!(
            "{label} must set exactly one of command or endpoint, not both"
        )),
        (None, None) => Err(anyhow!("{label} must set one of command or endpoint")),
        (Some(command), None) => {
            let args = shell_words::split(command)
                .with_context(|| format!("parse {label} command: {command}"))?;
            if args.is_empty() {
                return Err(anyhow!("{label} command is empty"));
            }
            Ok(())
        }
        (None, Some(http)) => {
            if http.base_url.trim().is_empty() {
                return Err(anyhow!("{label} endpoint base_url must be non-empty"));
            }
            if http.model.trim().is_empty() {
                return Err(anyhow!("{label} endpoint model must be non-empty"));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
impl RunConfig {
    /// Minimal valid config for unit tests.
    pub fn sample() -> Self {
        RunConfig {
            schema_version: CONFIG_SCHEMA_VERSION,
            event_name: "Demo Workshop".to_string(),
            roster_path: "roster.json".to_string(),
            artifacts_dir: "materials".to_string(),
            runs_root: default_runs_root(),
            match_threshold: default_match_threshold(),
            qa_score_floor: default_qa_score_floor(),
            workers: default_workers(),
            session_ids: Vec::new(),
            summarizer: LmEndpoint {
                command: Some("cat".to_string()),
                endpoint: None,
                timeout_ms: default_timeout_ms(),
                max_retries: default_max_retries(),
            },
            evaluator: LmEndpoint {
                command: Some("cat".to_string()),
                endpoint: None,
                timeout_ms: default_timeout_ms(),
                max_retries: default_max_retries(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let raw = r#"{
            "schema_version": 1,
            "event_name": "Demo",
            "roster_path": "roster.csv",
            "artifacts_dir": "materials",
            "summarizer": {"command": "cat"},
            "evaluator": {"command": "cat"}
        }"#;
        let config: RunConfig = serde_json::from_str(raw).expect("parse config");
        validate_config(&config).expect("valid config");
        assert_eq!(config.runs_root, "runs");
        assert!((config.match_threshold - 0.70).abs() < f64::EPSILON);
        assert_eq!(config.qa_score_floor, 3);
        assert_eq!(config.workers, 4);
        assert_eq!(config.summarizer.max_retries, 2);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{
            "schema_version": 1,
            "event_name": "Demo",
            "roster_path": "roster.csv",
            "artifacts_dir": "materials",
            "surprise": true,
            "summarizer": {"command": "cat"},
            "evaluator": {"command": "cat"}
        }"#;
        assert!(serde_json::from_str::<RunConfig>(raw).is_err());
    }

    #[test]
    fn bad_threshold_is_rejected() {
        let mut config = RunConfig::sample();
        config.match_threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn endpoint_requires_exactly_one_transport() {
        let mut config = RunConfig::sample();
        config.summarizer.command = None;
        assert!(validate_config(&config).is_err());
    }
}
