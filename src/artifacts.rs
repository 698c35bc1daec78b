//! Artifact ingestion.
//!
//! Walks the materials directory and turns each supported file into a typed
//! record with extracted text and a content hash. A single unreadable or
//! unsupported file never fails ingest; it becomes a recovered extraction
//! flag and is excluded from matching.
use crate::state::{Artifact, FlagStage, SessionFlag};
use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions the pipeline extracts natively.
const TEXT_EXTENSIONS: [&str; 4] = ["md", "markdown", "txt", "csv"];

/// Result of walking the materials directory.
#[derive(Debug)]
pub struct IngestedArtifacts {
    pub artifacts: Vec<Artifact>,
    pub flags: Vec<SessionFlag>,
}

/// Ingest all artifacts under a materials directory, sorted by id.
pub fn ingest_artifacts(dir: &Path) -> Result<IngestedArtifacts> {
    if !dir.is_dir() {
        return Err(anyhow!("artifacts dir {} is not a directory", dir.display()));
    }
    let files = collect_files_recursive(dir)?;
    let mut artifacts = Vec::new();
    let mut flags = Vec::new();
    for file in files {
        let id = rel_id(dir, &file);
        match extract_text(&file) {
            Ok(text) => {
                let bytes = fs::read(&file)
                    .with_context(|| format!("read {}", file.display()))?;
                artifacts.push(Artifact {
                    normalized_name: normalized_name(&file),
                    extracted_text: text,
                    content_hash: sha256_hex(&bytes),
                    id,
                });
            }
            Err(err) => {
                tracing::warn!(artifact = %id, "extraction failed: {err:#}");
                flags.push(SessionFlag {
                    session_id: None,
                    artifact_id: Some(id),
                    stage: FlagStage::Extraction,
                    code: extraction_code(&file),
                    message: format!("{err:#}"),
                });
            }
        }
    }
    artifacts.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(IngestedArtifacts { artifacts, flags })
}

/// Extract text from one artifact file.
///
/// The format set is deliberately narrow; richer extractors slot in here
/// without touching the matcher or the engine.
pub fn extract_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
        return Err(anyhow!("unsupported format {:?}", extension));
    }
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn extraction_code(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        "read_error".to_string()
    } else {
        "unsupported_format".to_string()
    }
}

/// Lowercased file stem with whitespace collapsed; the matcher normalizes
/// further, this just gives it a stable starting point.
fn normalized_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn rel_id(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn collect_files_recursive(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry.with_context(|| format!("read {}", root.display()))?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if path.is_dir() {
            files.extend(collect_files_recursive(&path)?);
        } else if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_extracts_text_and_flags_unsupported_files() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("dwarf_notes.md"), "line table talk").expect("write");
        fs::write(temp.path().join("slides.pptx"), b"\x50\x4b").expect("write");
        let ingested = ingest_artifacts(temp.path()).expect("ingest");
        assert_eq!(ingested.artifacts.len(), 1);
        let artifact = &ingested.artifacts[0];
        assert_eq!(artifact.id, "dwarf_notes.md");
        assert_eq!(artifact.normalized_name, "dwarf_notes");
        assert_eq!(artifact.extracted_text, "line table talk");
        assert_eq!(artifact.content_hash.len(), 64);
        assert_eq!(ingested.flags.len(), 1);
        assert_eq!(ingested.flags[0].code, "unsupported_format");
        assert_eq!(ingested.flags[0].artifact_id.as_deref(), Some("slides.pptx"));
    }

    #[test]
    fn ingest_is_sorted_and_recursive() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(temp.path().join("nested")).expect("mkdir");
        fs::write(temp.path().join("nested/b.txt"), "b").expect("write");
        fs::write(temp.path().join("a.txt"), "a").expect("write");
        let ingested = ingest_artifacts(temp.path()).expect("ingest");
        let ids: Vec<&str> = ingested
            .artifacts
            .iter()
            .map(|artifact| artifact.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a.txt", "nested/b.txt"]);
    }
}
