use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn wrep() -> &'static str {
    env!("CARGO_BIN_EXE_wrep")
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: PathBuf,
    config_path: PathBuf,
}

/// Roster + materials + config with deterministic fake models: `head`
/// echoes a prefix of the prompt as the "summary", `echo` produces a clean
/// evaluator verdict.
fn fixture(sessions: &str, files: &[(&str, &str)], summarizer: &str) -> Fixture {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().to_path_buf();
    fs::write(root.join("roster.json"), sessions).expect("write roster");
    let materials = root.join("materials");
    fs::create_dir_all(&materials).expect("create materials dir");
    for (name, contents) in files {
        fs::write(materials.join(name), contents).expect("write material");
    }
    let config = serde_json::json!({
        "schema_version": 1,
        "event_name": "Demo Workshop",
        "roster_path": root.join("roster.json"),
        "artifacts_dir": materials,
        "runs_root": root.join("runs"),
        "summarizer": {"command": summarizer, "max_retries": 0, "timeout_ms": 30000},
        "evaluator": {
            "command": "echo '{\"scores\": {\"accuracy\": 5, \"coverage\": 5}, \"flags\": []}'",
            "max_retries": 0,
            "timeout_ms": 30000
        }
    });
    let config_path = root.join("config.json");
    fs::write(
        &config_path,
        serde_json::to_string_pretty(&config).expect("serialize config"),
    )
    .expect("write config");
    Fixture {
        _temp: temp,
        root,
        config_path,
    }
}

fn run_wrep(args: &[&str]) -> Output {
    Command::new(wrep())
        .args(args)
        .output()
        .expect("run wrep")
}

fn runs_root(fixture: &Fixture) -> String {
    fixture.root.join("runs").to_string_lossy().into_owned()
}

fn ingest(fixture: &Fixture) -> String {
    let output = run_wrep(&["ingest", "--config", fixture.config_path.to_str().expect("path")]);
    assert!(
        output.status.success(),
        "ingest failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn status_json(fixture: &Fixture, run_id: &str) -> serde_json::Value {
    let root = runs_root(fixture);
    let output = run_wrep(&[
        "status",
        "--run-id",
        run_id,
        "--runs-root",
        root.as_str(),
        "--json",
    ]);
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("parse status JSON")
}

fn state_json(fixture: &Fixture, run_id: &str) -> serde_json::Value {
    let path = fixture.root.join("runs").join(run_id).join("state.json");
    let bytes = fs::read(path).expect("read state");
    serde_json::from_slice(&bytes).expect("parse state")
}

const TWO_SESSION_ROSTER: &str = r#"[
    {"id": "dwarf", "title": "Debugging Formats", "leaders": ["Ada Lovelace"]},
    {"id": "mape", "title": "Model and Performance Evaluation"}
]"#;

#[test]
fn match_gate_halts_and_unedited_resume_reaches_published() {
    let fixture = fixture(
        TWO_SESSION_ROSTER,
        &[
            ("dwarf_notes.md", "Discussion of line tables and DWARF v6."),
            ("random_notes.md", "Unrelated grocery list."),
        ],
        "head -c 200",
    );
    let run_id = ingest(&fixture);
    let root = runs_root(&fixture);

    let output = run_wrep(&["match", "--run-id", &run_id, "--runs-root", root.as_str()]);
    assert_eq!(output.status.code(), Some(2), "match should halt at the gate");

    let status = status_json(&fixture, &run_id);
    assert_eq!(status["phase"], "awaiting_match_review");
    assert_eq!(status["pending_review"], true);

    let state = state_json(&fixture, &run_id);
    let matches = state["matches"].as_array().expect("matches array");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["session_id"], "dwarf");
    assert_eq!(matches[0]["artifact_id"], "dwarf_notes.md");
    assert!((matches[0]["confidence"].as_f64().expect("confidence") - 0.85).abs() < 1e-9);
    assert_eq!(
        state["unmatched_artifact_ids"],
        serde_json::json!(["random_notes.md"])
    );

    let review_path = fixture
        .root
        .join("runs")
        .join(&run_id)
        .join("review/match_review.json");
    assert!(review_path.is_file(), "gate must export a review file");
    let matches_before = state["matches"].clone();

    // Unedited resume: accepts matcher output and runs to the end.
    let output = run_wrep(&["resume", "--run-id", &run_id, "--runs-root", root.as_str()]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "resume failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let state = state_json(&fixture, &run_id);
    assert_eq!(state["phase"], "published");
    assert_eq!(state["matches"], matches_before, "round-trip must keep matches");
    assert!(state["summaries"]["dwarf"]
        .as_str()
        .expect("dwarf summary")
        .contains("workshop report"));

    let reports = fixture.root.join("runs").join(&run_id).join("reports");
    assert!(reports.join("dwarf.md").is_file());
    assert!(reports.join("mape.md").is_file());
    assert!(reports.join("report.md").is_file());
    let rollup = fs::read_to_string(reports.join("report.md")).expect("read rollup");
    assert!(rollup.contains("random_notes.md"));

    // Resume with no external changes must not disturb the checkpoint.
    let state_path = fixture.root.join("runs").join(&run_id).join("state.json");
    let before = fs::read(&state_path).expect("read state");
    let output = run_wrep(&["resume", "--run-id", &run_id, "--runs-root", root.as_str()]);
    assert_eq!(output.status.code(), Some(0));
    let after = fs::read(&state_path).expect("read state");
    assert_eq!(before, after, "resume after terminal phase must be a no-op");
}

#[test]
fn resume_without_review_file_stays_halted() {
    let fixture = fixture(
        TWO_SESSION_ROSTER,
        &[("dwarf_notes.md", "notes"), ("random_notes.md", "noise")],
        "head -c 200",
    );
    let run_id = ingest(&fixture);
    let root = runs_root(&fixture);

    let output = run_wrep(&["match", "--run-id", &run_id, "--runs-root", root.as_str()]);
    assert_eq!(output.status.code(), Some(2));

    let review_path = fixture
        .root
        .join("runs")
        .join(&run_id)
        .join("review/match_review.json");
    fs::remove_file(&review_path).expect("remove review");

    let output = run_wrep(&["resume", "--run-id", &run_id, "--runs-root", root.as_str()]);
    assert_eq!(output.status.code(), Some(2), "missing review is a halt, not an error");
    assert!(String::from_utf8_lossy(&output.stderr).contains("supply the review"));

    let status = status_json(&fixture, &run_id);
    assert_eq!(status["phase"], "awaiting_match_review");
}

#[test]
fn review_with_unknown_id_is_a_fatal_error() {
    let fixture = fixture(
        TWO_SESSION_ROSTER,
        &[("dwarf_notes.md", "notes"), ("random_notes.md", "noise")],
        "head -c 200",
    );
    let run_id = ingest(&fixture);
    let root = runs_root(&fixture);
    run_wrep(&["match", "--run-id", &run_id, "--runs-root", root.as_str()]);

    let review_path = fixture
        .root
        .join("runs")
        .join(&run_id)
        .join("review/match_review.json");
    let mut review: serde_json::Value =
        serde_json::from_slice(&fs::read(&review_path).expect("read review")).expect("parse");
    review["entries"]
        .as_array_mut()
        .expect("entries")
        .push(serde_json::json!({
            "artifact_id": "dwarf_notes.md",
            "session_id": "ghost",
            "confidence": 1.0,
            "method": "review",
            "rationale": "typo",
            "accept": true
        }));
    fs::write(
        &review_path,
        serde_json::to_string_pretty(&review).expect("serialize"),
    )
    .expect("write review");

    let output = run_wrep(&["resume", "--run-id", &run_id, "--runs-root", root.as_str()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
}

#[test]
fn one_failing_session_flags_only_itself() {
    // The summarizer fails for the session whose prompt names zeta and
    // succeeds for the others.
    let summarizer = "sh -c 'input=$(cat); case \"$input\" in *\"id: zeta\"*) exit 1;; esac; printf \"A solid factual summary.\"'";
    let roster = r#"[
        {"id": "alpha", "title": "Alpha Working Group"},
        {"id": "beta", "title": "Beta Working Group"},
        {"id": "zeta", "title": "Zeta Working Group"}
    ]"#;
    let fixture = fixture(
        roster,
        &[
            ("alpha.md", "Alpha talked about things."),
            ("beta.md", "Beta talked about things."),
            ("zeta.md", "Zeta talked about things."),
        ],
        summarizer,
    );
    let run_id = {
        let output = run_wrep(&[
            "run",
            "--config",
            fixture.config_path.to_str().expect("path"),
        ]);
        assert_eq!(
            output.status.code(),
            Some(2),
            "run should halt at the eval gate: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    };

    let state = state_json(&fixture, &run_id);
    assert_eq!(state["phase"], "awaiting_eval_review");
    let summaries = state["summaries"].as_object().expect("summaries");
    assert!(summaries.contains_key("alpha"));
    assert!(summaries.contains_key("beta"));
    assert!(!summaries.contains_key("zeta"));
    let flags = state["session_flags"].as_array().expect("flags");
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0]["session_id"], "zeta");
    assert_eq!(flags[0]["code"], "summarize_failed");

    // The reviewer saw the flag; an unedited resume carries it into the
    // published report instead of blocking forever.
    let root = runs_root(&fixture);
    let output = run_wrep(&["resume", "--run-id", &run_id, "--runs-root", root.as_str()]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "resume failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let state = state_json(&fixture, &run_id);
    assert_eq!(state["phase"], "published");

    let zeta_report = fixture
        .root
        .join("runs")
        .join(&run_id)
        .join("reports/zeta.md");
    let text = fs::read_to_string(zeta_report).expect("read zeta report");
    assert!(text.contains("Review Notes"));
    assert!(text.contains("summarize_failed"));
}

#[test]
fn status_reports_phase_for_fresh_run() {
    let fixture = fixture(
        TWO_SESSION_ROSTER,
        &[("dwarf_notes.md", "notes"), ("random_notes.md", "noise")],
        "head -c 200",
    );
    let run_id = ingest(&fixture);
    let status = status_json(&fixture, &run_id);
    assert_eq!(status["phase"], "ingested");
    assert_eq!(status["pending_review"], false);
    assert_eq!(status["session_count"], 2);
    assert_eq!(status["artifact_count"], 2);
    let next = status["next_command"].as_str().expect("next command");
    assert!(next.contains("wrep match"));
}

#[test]
fn second_phase_command_out_of_order_is_fatal() {
    let fixture = fixture(
        TWO_SESSION_ROSTER,
        &[("dwarf_notes.md", "notes"), ("random_notes.md", "noise")],
        "head -c 200",
    );
    let run_id = ingest(&fixture);
    let root = runs_root(&fixture);
    let output = run_wrep(&[
        "summarize",
        "--run-id",
        &run_id,
        "--runs-root",
        root.as_str(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("requires matched"));
}
