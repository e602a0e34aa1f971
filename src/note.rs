//! Markdown notes for processed source documents.
//!
//! A note lives at the vault path mirroring its source (see
//! [`VaultContext::note_path_for`]) and looks like:
//!
//! ```text
//! ---
//! title: Capital Budgeting
//! type: pdf-reference
//! source-file: /resources/MBA/Finance/capital-budgeting.pdf
//! program: MBA
//! course: Finance
//! ---
//! # Capital Budgeting
//!
//! ## Summary
//!
//! ...
//!
//! ## Notes
//! ```
//!
//! A note belongs to the source named in its `source-file`. When that path is
//! taken by another source (`week1.pdf` next to `week1.mp4`, or two sources
//! outside the resources root with the same name), the note gets the source
//! extension in its name (`week1-mp4.md`); if that is taken too the item
//! fails rather than touching someone else's note.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::content::title_case;
use crate::error::{Result, VaultError};
use crate::frontmatter::{Metadata, MetadataStore, NoteDocument};
use crate::hierarchy::{self, IndexType};
use crate::metadata::{reconcile, PathLocks, TYPE_KEY};
use crate::queue::DocumentType;
use crate::vault::VaultContext;

pub const SOURCE_FILE_KEY: &str = "source-file";
pub const SHARE_LINK_KEY: &str = "share-link";

/// Result of [`NoteBuilder::create_note`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteOutcome {
    pub path: PathBuf,
    /// False when an existing note was kept.
    pub written: bool,
}

pub struct NoteBuilder {
    store: Arc<dyn MetadataStore>,
    locks: PathLocks,
    overwrite: bool,
}

impl NoteBuilder {
    /// With `overwrite` unset, notes that already exist are left alone.
    pub fn new(store: Arc<dyn MetadataStore>, locks: PathLocks, overwrite: bool) -> Self {
        Self {
            store,
            locks,
            overwrite,
        }
    }

    /// Write the note for `source` carrying `summary`.
    pub async fn create_note(
        &self,
        ctx: &VaultContext,
        source: &Path,
        document_type: DocumentType,
        summary: &str,
    ) -> Result<NoteOutcome> {
        let candidates = note_candidates(ctx, source);
        for path in &candidates {
            let _guard = self.locks.lock(path).await;

            let existing = if self.store.exists(path).await {
                let doc = self.store.read(path).await?;
                if let Some(owner) = other_owner(&doc.metadata, source) {
                    debug!(path = %path.display(), owner, "note belongs to another source");
                    continue;
                }
                if !self.overwrite {
                    info!(path = %path.display(), "note exists, keeping it");
                    return Ok(NoteOutcome {
                        path: path.clone(),
                        written: false,
                    });
                }
                Some(doc.metadata)
            } else {
                None
            };

            self.write_note(ctx, path, existing, source, document_type, summary)
                .await?;
            return Ok(NoteOutcome {
                path: path.clone(),
                written: true,
            });
        }

        let tried: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        Err(VaultError::Validation(format!(
            "note for {} collides with notes of other sources: {}",
            source.display(),
            tried.join(", ")
        )))
    }

    async fn write_note(
        &self,
        ctx: &VaultContext,
        path: &Path,
        existing: Option<Metadata>,
        source: &Path,
        document_type: DocumentType,
        summary: &str,
    ) -> Result<()> {
        let title = source
            .file_stem()
            .map(|s| title_case(&s.to_string_lossy()))
            .unwrap_or_default();

        let mut metadata = existing.unwrap_or_else(Metadata::new);
        metadata.set_str("title", title.clone());
        metadata.set_str(TYPE_KEY, document_type.note_type());
        metadata.set_str(SOURCE_FILE_KEY, source.to_string_lossy());
        let hierarchy = hierarchy::detect(path, ctx.vault_root())?;
        let (metadata, _) = reconcile(&metadata, &hierarchy, IndexType::Content, false);

        let body = format!(
            "# {}\n\n## Summary\n\n{}\n\n## Notes\n",
            title,
            summary.trim()
        );
        self.store
            .write(path, &NoteDocument::new(metadata, body))
            .await?;
        info!(path = %path.display(), document_type = %document_type, "wrote note");
        Ok(())
    }

    /// Record `link` in the frontmatter of `source`'s note.
    ///
    /// Fails when the note's `source-file` names a different document.
    pub async fn record_share_link(&self, note: &Path, source: &Path, link: &str) -> Result<()> {
        let _guard = self.locks.lock(note).await;
        let mut doc = self.store.read(note).await?;
        if let Some(owner) = other_owner(&doc.metadata, source) {
            return Err(VaultError::Validation(format!(
                "{} belongs to {}, not {}",
                note.display(),
                owner,
                source.display()
            )));
        }
        if doc.metadata.get_str(SHARE_LINK_KEY) == Some(link) {
            return Ok(());
        }
        doc.metadata.set_str(SHARE_LINK_KEY, link);
        self.store.write(note, &doc).await
    }
}

/// Note paths `source` may use, in order of preference.
fn note_candidates(ctx: &VaultContext, source: &Path) -> Vec<PathBuf> {
    let primary = ctx.note_path_for(source);
    let mut candidates = vec![primary.clone()];
    if let (Some(stem), Some(ext)) = (source.file_stem(), source.extension()) {
        let name = format!("{}-{}.md", stem.to_string_lossy(), ext.to_string_lossy());
        candidates.push(primary.with_file_name(name));
    }
    candidates
}

/// The `source-file` of a note when it names a document other than `source`.
/// Notes without one (hand-written) count as free.
fn other_owner<'a>(metadata: &'a Metadata, source: &Path) -> Option<&'a str> {
    metadata
        .get_str(SOURCE_FILE_KEY)
        .map(str::trim)
        .filter(|owner| !owner.is_empty() && *owner != source.to_string_lossy())
}
