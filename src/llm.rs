//! External summarizer/evaluator invocation.
//!
//! The engine treats both models as opaque text-in/text-out functions with a
//! timeout and a bounded retry budget. Two transports are supported: a
//! user-configured subprocess (prompt on stdin, text on stdout) and an
//! OpenAI-compatible `chat/completions` endpoint. Exhausting retries is the
//! caller's per-session problem, never a phase failure.
use crate::config::{HttpEndpoint, LmEndpoint};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::env;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const RETRY_BACKOFF_BASE_MS: u64 = 500;
const CHILD_POLL_INTERVAL_MS: u64 = 50;

/// Complete a prompt against an endpoint, retrying with exponential backoff.
pub fn complete(endpoint: &LmEndpoint, label: &str, prompt: &str) -> Result<String> {
    let timeout = Duration::from_millis(endpoint.timeout_ms);
    let mut last_error = None;
    for attempt in 0..=endpoint.max_retries {
        if attempt > 0 {
            let backoff = RETRY_BACKOFF_BASE_MS << (attempt - 1);
            tracing::info!(label, attempt, backoff_ms = backoff, "retrying after backoff");
            thread::sleep(Duration::from_millis(backoff));
        }
        let result = match (&endpoint.command, &endpoint.endpoint) {
            (Some(command), _) => invoke_command(command, label, prompt, timeout),
            (None, Some(http)) => invoke_http(http, label, prompt, timeout),
            (None, None) => Err(anyhow!("{label} has no transport configured")),
        };
        match result {
            Ok(text) => return Ok(text),
            Err(err) => {
                tracing::warn!(label, attempt, "{label} call failed: {err:#}");
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("{label} failed with no attempts made")).context(
        format!(
            "{label} failed after {} attempts",
            endpoint.max_retries + 1
        ),
    ))
}

/// Verify a command transport resolves to an executable before a phase
/// starts burning per-session attempts on it.
pub fn check_command_available(endpoint: &LmEndpoint, label: &str) -> Result<()> {
    let Some(command) = endpoint.command.as_deref() else {
        return Ok(());
    };
    let args =
        shell_words::split(command).with_context(|| format!("parse {label} command: {command}"))?;
    let program = args
        .first()
        .ok_or_else(|| anyhow!("{label} command is empty"))?;
    which::which(program)
        .map(|_| ())
        .with_context(|| format!("{label} command {program:?} not found on PATH"))
}

/// Run the subprocess transport with a hard timeout.
fn invoke_command(command: &str, label: &str, prompt: &str, timeout: Duration) -> Result<String> {
    let args =
        shell_words::split(command).with_context(|| format!("parse {label} command: {command}"))?;
    if args.is_empty() {
        return Err(anyhow!("{label} command is empty"));
    }
    let mut child = Command::new(&args[0])
        .args(&args[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {label} command {:?}", args[0]))?;

    // Readers must be draining stdout/stderr before the prompt goes in, or a
    // large prompt plus a chatty child can deadlock on full pipe buffers.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("{label} stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("{label} stderr not captured"))?;
    let stdout_reader = thread::spawn(move || read_to_vec(stdout));
    let stderr_reader = thread::spawn(move || read_to_vec(stderr));

    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        // A command that exits without reading stdin (or never reads it at
        // all) closes the pipe; that is its business, not an error here.
        if let Err(err) = stdin.write_all(prompt.as_bytes()) {
            if err.kind() != std::io::ErrorKind::BrokenPipe {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow::Error::new(err).context(format!("write {label} prompt")));
            }
        }
    }

    let status = wait_with_timeout(&mut child, timeout)
        .with_context(|| format!("wait for {label} command"))?;
    let stdout_bytes = join_reader(stdout_reader)?;
    let stderr_bytes = join_reader(stderr_reader)?;

    let Some(status) = status else {
        return Err(anyhow!(
            "{label} command timed out after {} ms",
            timeout.as_millis()
        ));
    };
    if !status.success() {
        let stderr_text = String::from_utf8_lossy(&stderr_bytes);
        return Err(anyhow!(
            "{label} command failed with status {}: {}",
            status,
            stderr_text.trim()
        ));
    }
    String::from_utf8(stdout_bytes).with_context(|| format!("decode {label} stdout as UTF-8"))
}

fn read_to_vec(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn join_reader(handle: thread::JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result.context("read child output"),
        Err(_) => Err(anyhow!("child output reader panicked")),
    }
}

/// Poll the child until it exits or the timeout elapses; on timeout the
/// child is killed and None is returned.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<std::process::ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("poll child process")? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(CHILD_POLL_INTERVAL_MS));
    }
}

/// Run the OpenAI-compatible HTTP transport.
fn invoke_http(
    endpoint: &HttpEndpoint,
    label: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<String> {
    let url = format!(
        "{}/chat/completions",
        endpoint.base_url.trim_end_matches('/')
    );
    let body = serde_json::json!({
        "model": endpoint.model,
        "messages": [{"role": "user", "content": prompt}],
    });
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    let agent = config.new_agent();
    let mut request = agent.post(&url);
    if let Some(key_env) = endpoint.api_key_env.as_deref() {
        let key = env::var(key_env)
            .with_context(|| format!("{label} api key env {key_env:?} is not set"))?;
        request = request.header("authorization", format!("Bearer {key}"));
    }
    let mut response = request
        .send_json(&body)
        .with_context(|| format!("{label} request to {url}"))?;
    let value: Value = response
        .body_mut()
        .read_json()
        .with_context(|| format!("parse {label} response from {url}"))?;
    value
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{label} response is missing choices[0].message.content"))
}

/// Extract JSON from model output that might carry Markdown code fences.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }
    if let Some(start) = text.find("```") {
        let start = start + 3;
        let start = text[start..]
            .find('\n')
            .map(|offset| start + offset + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }
    text
}
