//! YAML frontmatter parsing and the file-backed [`MetadataStore`].
//!
//! A markdown document optionally starts with a metadata block:
//!
//! ```text
//! ---
//! title: Week 1 Reading
//! program: MBA
//! ---
//! # Body starts here
//! ```
//!
//! The block is parsed into an ordered [`Metadata`] map. Key order survives a
//! read/write cycle and the body is kept byte for byte, so rewriting a file
//! only changes the keys that were actually touched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_yaml::{Mapping, Value};

use crate::error::{Result, VaultError};

const DELIMITER: &str = "---";

/// Ordered key/value metadata attached to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(Mapping);

impl Metadata {
    pub fn new() -> Self {
        Self(Mapping::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// True when `key` is missing, null, or an empty/whitespace string.
    pub fn is_blank(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        }
    }

    /// Set `key`, keeping its position when it already exists.
    pub fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.0
            .insert(Value::String(key.to_string()), Value::String(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in document order (non-string keys are skipped).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().filter_map(Value::as_str)
    }

    fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        if self.0.is_empty() {
            return Ok(String::new());
        }
        serde_yaml::to_string(&self.0)
    }
}

/// A parsed markdown document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteDocument {
    pub metadata: Metadata,
    pub body: String,
}

impl NoteDocument {
    pub fn new(metadata: Metadata, body: impl Into<String>) -> Self {
        Self {
            metadata,
            body: body.into(),
        }
    }

    /// Split `text` into frontmatter and body.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let Some(after_open) = strip_delimiter_line(text) else {
            return Ok(Self::new(Metadata::new(), text));
        };

        let mut offset = 0;
        let mut yaml_end = None;
        for line in after_open.split_inclusive('\n') {
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed == DELIMITER || trimmed == "..." {
                yaml_end = Some((offset, offset + line.len()));
                break;
            }
            offset += line.len();
        }

        let (yaml_len, body_start) =
            yaml_end.ok_or_else(|| VaultError::parse(path, "unterminated frontmatter block"))?;
        let yaml = &after_open[..yaml_len];
        let body = &after_open[body_start..];

        let metadata = if yaml.trim().is_empty() {
            Metadata::new()
        } else {
            match serde_yaml::from_str::<Value>(yaml) {
                Ok(Value::Mapping(map)) => Metadata(map),
                Ok(Value::Null) => Metadata::new(),
                Ok(_) => return Err(VaultError::parse(path, "frontmatter is not a mapping")),
                Err(e) => return Err(VaultError::parse(path, e.to_string())),
            }
        };

        Ok(Self::new(metadata, body))
    }

    /// Render back to markdown text. Documents without metadata render as
    /// the bare body.
    pub fn render(&self, path: &Path) -> Result<String> {
        if self.metadata.is_empty() {
            return Ok(self.body.clone());
        }
        let yaml = self
            .metadata
            .to_yaml()
            .map_err(|e| VaultError::parse(path, e.to_string()))?;
        let mut out = String::with_capacity(yaml.len() + self.body.len() + 8);
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&yaml);
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&self.body);
        Ok(out)
    }
}

fn strip_delimiter_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(DELIMITER)?;
    rest.strip_prefix('\n')
        .or_else(|| rest.strip_prefix("\r\n"))
}

/// Read/write access to document metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read and parse the document at `path`.
    async fn read(&self, path: &Path) -> Result<NoteDocument>;

    /// Replace the document at `path`.
    async fn write(&self, path: &Path, doc: &NoteDocument) -> Result<()>;

    /// Replace only the metadata block, keeping the body.
    async fn write_metadata(&self, path: &Path, metadata: &Metadata) -> Result<()> {
        let mut doc = self.read(path).await?;
        doc.metadata = metadata.clone();
        self.write(path, &doc).await
    }

    async fn exists(&self, path: &Path) -> bool;
}

/// [`MetadataStore`] over markdown files on disk.
#[derive(Debug, Clone, Default)]
pub struct FrontmatterStore;

impl FrontmatterStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataStore for FrontmatterStore {
    async fn read(&self, path: &Path) -> Result<NoteDocument> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(path.to_path_buf())
            } else {
                VaultError::io(path, e)
            }
        })?;
        NoteDocument::parse(path, &text)
    }

    async fn write(&self, path: &Path, doc: &NoteDocument) -> Result<()> {
        let text = doc.render(path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::io(parent, e))?;
        }
        // Write-then-rename so a crash never leaves a half-written note.
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| VaultError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| VaultError::io(path, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(text: &str) -> Result<NoteDocument> {
        NoteDocument::parse(Path::new("note.md"), text)
    }

    #[test]
    fn parses_frontmatter_and_body() {
        let doc = parse("---\ntitle: Intro\nprogram: MBA\n---\n# Heading\n\nText.\n").unwrap();
        assert_eq!(doc.metadata.get_str("title"), Some("Intro"));
        assert_eq!(doc.metadata.get_str("program"), Some("MBA"));
        assert_eq!(doc.body, "# Heading\n\nText.\n");
    }

    #[test]
    fn document_without_frontmatter() {
        let doc = parse("# Just a body\n").unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, "# Just a body\n");
        assert_eq!(doc.render(Path::new("note.md")).unwrap(), "# Just a body\n");
    }

    #[test]
    fn crlf_and_empty_blocks() {
        let doc = parse("---\r\n---\r\nbody").unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, "body");
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = parse("---\ntitle: [unclosed\n---\nbody").unwrap_err();
        assert!(matches!(err, VaultError::Parse { .. }));

        let err = parse("---\n- a list\n---\n").unwrap_err();
        assert!(matches!(err, VaultError::Parse { .. }));

        let err = parse("---\ntitle: x\nno closing delimiter\n").unwrap_err();
        assert!(matches!(err, VaultError::Parse { .. }));
    }

    #[test]
    fn render_preserves_key_order() {
        let doc = parse("---\nzeta: 1\nalpha: two\nmiddle: true\n---\nbody\n").unwrap();
        let keys: Vec<&str> = doc.metadata.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "middle"]);

        let rendered = doc.render(Path::new("note.md")).unwrap();
        assert_eq!(rendered, "---\nzeta: 1\nalpha: two\nmiddle: true\n---\nbody\n");
    }

    #[test]
    fn set_existing_key_keeps_position() {
        let mut doc = parse("---\na: x\nb: y\n---\n").unwrap();
        doc.metadata.set_str("a", "changed");
        doc.metadata.set_str("c", "new");
        let keys: Vec<&str> = doc.metadata.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn blank_detection() {
        let doc = parse("---\nempty: ''\nnull_value:\nspaces: '  '\nset: MBA\nnum: 3\n---\n").unwrap();
        assert!(doc.metadata.is_blank("empty"));
        assert!(doc.metadata.is_blank("null_value"));
        assert!(doc.metadata.is_blank("spaces"));
        assert!(doc.metadata.is_blank("missing"));
        assert!(!doc.metadata.is_blank("set"));
        assert!(!doc.metadata.is_blank("num"));
    }

    #[tokio::test]
    async fn store_round_trip_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("note.md");
        let store = FrontmatterStore::new();

        let mut metadata = Metadata::new();
        metadata.set_str("title", "Week 1");
        store
            .write(&path, &NoteDocument::new(metadata, "# Week 1\n"))
            .await
            .unwrap();
        assert!(store.exists(&path).await);

        let mut doc = store.read(&path).await.unwrap();
        assert_eq!(doc.metadata.get_str("title"), Some("Week 1"));

        doc.metadata.set_str("course", "Finance");
        store.write_metadata(&path, &doc.metadata).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "---\ntitle: Week 1\ncourse: Finance\n---\n# Week 1\n");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = FrontmatterStore::new()
            .read(&tmp.path().join("absent.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }
}
