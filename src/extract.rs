//! Text extraction for source documents.
//!
//! PDFs are read through `pdf-extract`. Videos carry no text of their own, so
//! their text comes from a transcript stored next to the video (or in a
//! sibling `Transcripts/` folder). Subtitle formats have their cue numbers and
//! timestamps stripped so only the spoken text reaches the summarizer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::queue::DocumentType;

/// Transcript extensions tried for a video, in order.
const TRANSCRIPT_EXTENSIONS: [&str; 4] = ["txt", "md", "srt", "vtt"];

/// Folder next to a video that may hold its transcript.
const TRANSCRIPTS_DIR: &str = "Transcripts";

/// Text pulled from one source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub text: String,
    /// Size of the source document on disk.
    pub size_bytes: u64,
    /// Extractor-specific facts merged into the queue item's metadata.
    pub metadata: BTreeMap<String, Value>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path, document_type: DocumentType) -> Result<Extraction>;
}

/// Extracts from files on the local disk.
#[derive(Debug, Clone, Default)]
pub struct FileExtractor;

impl FileExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for FileExtractor {
    async fn extract(&self, path: &Path, document_type: DocumentType) -> Result<Extraction> {
        let size_bytes = tokio::fs::metadata(path)
            .await
            .map_err(|e| not_found_or_io(path, e))?
            .len();

        let mut extraction = match document_type {
            DocumentType::Pdf => extract_pdf(path).await?,
            DocumentType::Video => extract_transcript(path).await?,
        };
        extraction.size_bytes = size_bytes;
        extraction
            .metadata
            .insert("characters".to_string(), Value::from(extraction.text.chars().count()));
        debug!(
            path = %path.display(),
            size_bytes,
            text_bytes = extraction.text.len(),
            "extracted text"
        );
        Ok(extraction)
    }
}

async fn extract_pdf(path: &Path) -> Result<Extraction> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| not_found_or_io(path, e))?;

    // pdf-extract is CPU-bound and synchronous.
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| VaultError::external("pdf-extract", e.to_string()))?
        .map_err(|e| {
            VaultError::external("pdf-extract", format!("{}: {}", path.display(), e))
        })?;

    if text.trim().is_empty() {
        return Err(VaultError::external(
            "pdf-extract",
            format!("{} has no extractable text layer", path.display()),
        ));
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("extractor".to_string(), Value::from("pdf-extract"));
    Ok(Extraction {
        text,
        size_bytes: 0,
        metadata,
    })
}

async fn extract_transcript(video: &Path) -> Result<Extraction> {
    let transcript = find_transcript(video).ok_or_else(|| {
        VaultError::external(
            "transcript",
            format!("no transcript found for {}", video.display()),
        )
    })?;

    let raw = tokio::fs::read_to_string(&transcript)
        .await
        .map_err(|e| VaultError::io(&transcript, e))?;
    let is_subtitle = transcript
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("srt") || e.eq_ignore_ascii_case("vtt"));
    let text = if is_subtitle {
        strip_subtitle_cues(&raw)
    } else {
        raw
    };

    if text.trim().is_empty() {
        return Err(VaultError::external(
            "transcript",
            format!("{} is empty", transcript.display()),
        ));
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("extractor".to_string(), Value::from("transcript"));
    metadata.insert(
        "transcript_path".to_string(),
        Value::from(transcript.to_string_lossy().into_owned()),
    );
    Ok(Extraction {
        text,
        size_bytes: 0,
        metadata,
    })
}

/// First existing transcript candidate for `video`.
pub fn find_transcript(video: &Path) -> Option<PathBuf> {
    let stem = video.file_stem()?.to_string_lossy();
    let parent = video.parent()?;
    for folder in [parent.to_path_buf(), parent.join(TRANSCRIPTS_DIR)] {
        for ext in TRANSCRIPT_EXTENSIONS {
            let candidate = folder.join(format!("{}.{}", stem, ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Drop SRT/VTT headers, cue numbers and timing lines, and collapse the
/// repeated lines rolling captions produce.
pub fn strip_subtitle_cues(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.eq_ignore_ascii_case("WEBVTT")
            || line.starts_with("NOTE")
            || line.contains("-->")
            || line.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        if lines.last() == Some(&line) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> VaultError {
    if e.kind() == std::io::ErrorKind::NotFound {
        VaultError::NotFound(path.to_path_buf())
    } else {
        VaultError::io(path, e)
    }
}
