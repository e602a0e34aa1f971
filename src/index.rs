//! Folder index documents.
//!
//! Every folder below the vault root gets one `<Folder-Name>-Index.md`
//! listing its children. The document is fully derived from the folder, so
//! regenerating an unchanged folder produces identical content and nothing is
//! written. Metadata is merged rather than replaced: hand-edited frontmatter
//! values survive unless the caller forces an overwrite.
//!
//! An index whose frontmatter says `auto-generated-state: read-only` is never
//! touched, even when forced.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::FilesystemConfig;
use crate::content::{self, ContentType, VaultFileInfo};
use crate::error::{Result, VaultError};
use crate::frontmatter::{Metadata, MetadataStore, NoteDocument};
use crate::hierarchy::{self, HierarchyInfo, IndexType};
use crate::metadata::{reconcile, PathLocks, TYPE_KEY};
use crate::scan;
use crate::vault::VaultContext;

pub const STATE_KEY: &str = "auto-generated-state";
pub const STATE_WRITABLE: &str = "writable";
pub const STATE_READ_ONLY: &str = "read-only";

/// What happened to one folder's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Written (or, on a dry run, would have been).
    Written,
    Unchanged,
    ReadOnly,
}

/// Counters for a tree-wide index pass.
#[derive(Debug, Clone, Default)]
pub struct IndexRunStats {
    pub generated: u64,
    pub unchanged: u64,
    pub skipped_read_only: u64,
    pub failed: u64,
    pub failures: Vec<(PathBuf, String)>,
}

/// Immediate children of a folder, split into subfolders and files.
struct FolderListing {
    /// `(folder name, vault-relative path)` pairs.
    sections: Vec<(String, PathBuf)>,
    files: Vec<VaultFileInfo>,
}

pub struct IndexGenerator {
    store: Arc<dyn MetadataStore>,
    locks: PathLocks,
}

impl IndexGenerator {
    pub fn new(store: Arc<dyn MetadataStore>, locks: PathLocks) -> Self {
        Self { store, locks }
    }

    /// Generate or refresh the index for `folder`.
    ///
    /// Returns `true` when the index was written (or would be, on a dry run).
    pub async fn generate_index(
        &self,
        ctx: &VaultContext,
        folder: &Path,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<bool> {
        let outcome = self
            .generate_index_outcome(ctx, folder, force_overwrite, dry_run)
            .await?;
        Ok(outcome == IndexOutcome::Written)
    }

    /// Like [`generate_index`](Self::generate_index) but distinguishes a
    /// read-only skip from an unchanged index.
    pub async fn generate_index_outcome(
        &self,
        ctx: &VaultContext,
        folder: &Path,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<IndexOutcome> {
        if !folder.is_dir() {
            return Err(VaultError::NotFound(folder.to_path_buf()));
        }
        let index_type = hierarchy::classify_index_type(folder, ctx.vault_root(), true)?;
        let hierarchy = hierarchy::detect_folder(folder, ctx.vault_root())?;
        let index_path = content::index_path(folder);

        let _guard = self.locks.lock(&index_path).await;

        let existing = match self.store.read(&index_path).await {
            Ok(doc) => Some(doc),
            Err(VaultError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if let Some(doc) = &existing {
            if doc.metadata.get_str(STATE_KEY) == Some(STATE_READ_ONLY) {
                info!(path = %index_path.display(), "index is read-only, skipping");
                return Ok(IndexOutcome::ReadOnly);
            }
        }

        let listing = self.list_children(ctx, folder, &hierarchy).await?;
        let metadata = index_metadata(
            existing.as_ref().map(|d| &d.metadata),
            folder,
            &hierarchy,
            index_type,
            force_overwrite,
        );
        let body = render_body(ctx, folder, &listing)?;
        let doc = NoteDocument::new(metadata, body);

        if existing.as_ref() == Some(&doc) {
            debug!(path = %index_path.display(), "index unchanged");
            return Ok(IndexOutcome::Unchanged);
        }
        if dry_run {
            info!(path = %index_path.display(), index_type = %index_type, "would write index (dry run)");
            return Ok(IndexOutcome::Written);
        }

        self.store.write(&index_path, &doc).await?;
        info!(
            path = %index_path.display(),
            index_type = %index_type,
            children = listing.files.len() + listing.sections.len(),
            "wrote index"
        );
        Ok(IndexOutcome::Written)
    }

    /// Generate the index of every folder below the vault root.
    ///
    /// Per-folder failures are recorded and the pass continues; a missing
    /// vault root aborts.
    pub async fn generate_tree(
        &self,
        ctx: &VaultContext,
        fs_config: &FilesystemConfig,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<IndexRunStats> {
        self.generate_below(ctx, ctx.vault_root(), fs_config, force_overwrite, dry_run)
            .await
    }

    /// Generate the index of `folder` (unless it is the vault root) and of
    /// every folder below it.
    pub async fn generate_below(
        &self,
        ctx: &VaultContext,
        folder: &Path,
        fs_config: &FilesystemConfig,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<IndexRunStats> {
        if !ctx.vault_root().is_dir() {
            return Err(VaultError::NotFound(ctx.vault_root().to_path_buf()));
        }
        let mut folders = Vec::new();
        if hierarchy::folder_depth(folder, ctx.vault_root())? > 0 {
            folders.push(folder.to_path_buf());
        }
        folders.extend(scan::scan_folders(folder, fs_config)?);

        let mut stats = IndexRunStats::default();
        for folder in folders {
            match self
                .generate_index_outcome(ctx, &folder, force_overwrite, dry_run)
                .await
            {
                Ok(IndexOutcome::Written) => stats.generated += 1,
                Ok(IndexOutcome::Unchanged) => stats.unchanged += 1,
                Ok(IndexOutcome::ReadOnly) => stats.skipped_read_only += 1,
                Err(e) => {
                    warn!(folder = %folder.display(), error = %e, "index generation failed");
                    stats.failed += 1;
                    stats.failures.push((folder, e.to_string()));
                }
            }
        }
        Ok(stats)
    }

    async fn list_children(
        &self,
        ctx: &VaultContext,
        folder: &Path,
        hierarchy: &HierarchyInfo,
    ) -> Result<FolderListing> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(folder)
            .await
            .map_err(|e| VaultError::io(folder, e))?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| VaultError::io(folder, e))? {
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.file_name());

        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut listing = FolderListing {
            sections: Vec::new(),
            files: Vec::new(),
        };
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || content::is_index_file(&name, &folder_name) {
                continue;
            }
            let path = entry.path();
            let relative = ctx.relative(&path)?;
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| VaultError::io(&path, e))?;

            if file_type.is_dir() {
                listing.sections.push((name, relative));
                continue;
            }
            if !name.to_ascii_lowercase().ends_with(".md") {
                listing.files.push(VaultFileInfo::for_file(&relative));
                continue;
            }

            match self.store.read(&path).await {
                Ok(doc) => {
                    let info = VaultFileInfo::for_note(&relative, &doc);
                    warn_on_stale_hierarchy(&path, &info, hierarchy);
                    listing.files.push(info);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "excluding unreadable note from index");
                }
            }
        }
        Ok(listing)
    }
}

fn warn_on_stale_hierarchy(path: &Path, info: &VaultFileInfo, hierarchy: &HierarchyInfo) {
    let checks = [
        ("course", info.course.as_deref(), hierarchy.course.as_str()),
        ("module", info.module.as_deref(), hierarchy.module.as_str()),
    ];
    for (field, cached, computed) in checks {
        if let Some(cached) = cached {
            if !computed.is_empty() && cached != computed {
                warn!(
                    path = %path.display(),
                    field,
                    cached,
                    computed,
                    "note metadata disagrees with its folder"
                );
            }
        }
    }
}

/// Merge the index's template fields and hierarchy into its existing metadata.
fn index_metadata(
    existing: Option<&Metadata>,
    folder: &Path,
    hierarchy: &HierarchyInfo,
    index_type: IndexType,
    force_overwrite: bool,
) -> Metadata {
    let mut metadata = existing.cloned().unwrap_or_default();
    let folder_name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let template = [
        ("title", content::title_case(&folder_name)),
        (TYPE_KEY, index_type.as_str().to_string()),
        (STATE_KEY, STATE_WRITABLE.to_string()),
    ];
    for (key, value) in template {
        if metadata.is_blank(key) || force_overwrite {
            metadata.set_str(key, value);
        }
    }

    let (metadata, _) = reconcile(&metadata, hierarchy, index_type, force_overwrite);
    metadata
}

fn render_body(ctx: &VaultContext, folder: &Path, listing: &FolderListing) -> Result<String> {
    let folder_name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", content::title_case(&folder_name));

    if let Some(parent) = folder.parent() {
        if hierarchy::folder_depth(parent, ctx.vault_root())? > 0 {
            let parent_name = parent
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = content::link_path(
                &ctx.relative(parent)?
                    .join(content::index_link_name(&parent_name)),
            );
            let _ = writeln!(
                out,
                "[[{}|Back to {}]]\n",
                target,
                content::title_case(&parent_name)
            );
        }
    }

    if listing.sections.is_empty() && listing.files.is_empty() {
        out.push_str("_This folder is empty._\n");
        return Ok(out);
    }

    let mut groups: Vec<String> = Vec::new();

    if !listing.sections.is_empty() {
        let mut group = String::from("## Sections\n\n");
        for (name, relative) in &listing.sections {
            let target = content::link_path(&relative.join(content::index_link_name(name)));
            let _ = writeln!(group, "- [[{}|{}]]", target, content::title_case(name));
        }
        groups.push(group);
    }

    let mut by_type: BTreeMap<ContentType, Vec<&VaultFileInfo>> = BTreeMap::new();
    for info in &listing.files {
        by_type.entry(info.content_type).or_default().push(info);
    }
    for content_type in ContentType::ORDER {
        let Some(files) = by_type.get(&content_type) else {
            continue;
        };
        let mut group = format!("## {}\n\n", content_type.heading());
        for info in files {
            let _ = writeln!(group, "- {}", info.wiki_link());
        }
        groups.push(group);
    }

    out.push_str(&groups.join("\n"));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::FrontmatterStore;
    use std::fs;
    use tempfile::TempDir;

    fn generator() -> IndexGenerator {
        IndexGenerator::new(Arc::new(FrontmatterStore::new()), PathLocks::new())
    }

    fn vault() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let finance = tmp.path().join("MBA/Finance");
        fs::create_dir_all(finance.join("Investment")).unwrap();
        fs::write(
            finance.join("valuation.md"),
            "---\ntitle: Valuation Basics\ncourse: Finance\n---\nbody\n",
        )
        .unwrap();
        fs::write(finance.join("Week 1 Quiz.md"), "quiz\n").unwrap();
        fs::write(finance.join("slides.pdf"), "%PDF").unwrap();
        fs::write(finance.join("lecture.mp4"), "").unwrap();
        fs::write(finance.join(".hidden.md"), "secret").unwrap();
        tmp
    }

    #[tokio::test]
    async fn composes_grouped_index() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let folder = tmp.path().join("MBA/Finance");

        assert!(generator().generate_index(&ctx, &folder, false, false).await.unwrap());
        let text = fs::read_to_string(folder.join("Finance-Index.md")).unwrap();
        let expected = "---\n\
            title: Finance\n\
            type: course-index\n\
            auto-generated-state: writable\n\
            program: MBA\n\
            course: Finance\n\
            ---\n\
            # Finance\n\n\
            [[MBA/MBA-Index|Back to MBA]]\n\n\
            ## Sections\n\n\
            - [[MBA/Finance/Investment/Investment-Index|Investment]]\n\n\
            ## Readings\n\n\
            - [[MBA/Finance/slides.pdf|Slides]]\n\n\
            ## Videos\n\n\
            - [[MBA/Finance/lecture.mp4|Lecture]]\n\n\
            ## Quizzes\n\n\
            - [[MBA/Finance/Week 1 Quiz|Week 1 Quiz]]\n\n\
            ## Notes\n\n\
            - [[MBA/Finance/valuation|Valuation Basics]]\n";
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn regeneration_is_idempotent() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let folder = tmp.path().join("MBA/Finance");
        let gen = generator();

        assert!(gen.generate_index(&ctx, &folder, false, false).await.unwrap());
        let first = fs::read(folder.join("Finance-Index.md")).unwrap();
        assert!(!gen.generate_index(&ctx, &folder, false, false).await.unwrap());
        assert_eq!(fs::read(folder.join("Finance-Index.md")).unwrap(), first);
    }

    #[tokio::test]
    async fn lists_notes_named_like_indexes() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let folder = tmp.path().join("MBA/Finance");
        fs::write(folder.join("Glossary-Index.md"), "terms\n").unwrap();

        let gen = generator();
        gen.generate_index(&ctx, &folder, false, false).await.unwrap();
        let text = fs::read_to_string(folder.join("Finance-Index.md")).unwrap();
        assert!(text.contains("- [[MBA/Finance/Glossary-Index|Glossary Index]]"));
        assert!(!text.contains("Finance-Index|"));

        // The folder's own index is still left out on regeneration.
        assert!(!gen.generate_index(&ctx, &folder, false, false).await.unwrap());
    }

    #[tokio::test]
    async fn program_index_has_no_back_link() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let folder = tmp.path().join("MBA");
        generator().generate_index(&ctx, &folder, false, false).await.unwrap();
        let text = fs::read_to_string(folder.join("MBA-Index.md")).unwrap();
        assert!(text.contains("type: program-index"));
        assert!(!text.contains("Back to"));
        assert!(!text.contains("course:"));
    }

    #[tokio::test]
    async fn read_only_index_is_never_rewritten() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let folder = tmp.path().join("MBA/Finance");
        let index = folder.join("Finance-Index.md");
        let original = "---\nauto-generated-state: read-only\n---\nhand written\n";
        fs::write(&index, original).unwrap();

        let gen = generator();
        assert!(!gen.generate_index(&ctx, &folder, true, false).await.unwrap());
        assert_eq!(
            gen.generate_index_outcome(&ctx, &folder, true, false).await.unwrap(),
            IndexOutcome::ReadOnly
        );
        assert_eq!(fs::read_to_string(&index).unwrap(), original);
    }

    #[tokio::test]
    async fn existing_values_kept_unless_forced() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let folder = tmp.path().join("MBA/Finance");
        let index = folder.join("Finance-Index.md");
        fs::write(&index, "---\ntitle: Corporate Finance\nprogram: EMBA\n---\nold\n").unwrap();

        let gen = generator();
        gen.generate_index(&ctx, &folder, false, false).await.unwrap();
        let doc = FrontmatterStore::new().read(&index).await.unwrap();
        assert_eq!(doc.metadata.get_str("title"), Some("Corporate Finance"));
        assert_eq!(doc.metadata.get_str("program"), Some("EMBA"));
        assert!(doc.body.starts_with("# Finance\n"));

        gen.generate_index(&ctx, &folder, true, false).await.unwrap();
        let doc = FrontmatterStore::new().read(&index).await.unwrap();
        assert_eq!(doc.metadata.get_str("title"), Some("Finance"));
        assert_eq!(doc.metadata.get_str("program"), Some("MBA"));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let folder = tmp.path().join("MBA/Finance");
        assert!(generator().generate_index(&ctx, &folder, false, true).await.unwrap());
        assert!(!folder.join("Finance-Index.md").exists());
    }

    #[tokio::test]
    async fn unreadable_child_is_excluded() {
        let tmp = vault();
        let folder = tmp.path().join("MBA/Finance");
        fs::write(folder.join("broken.md"), "---\ntitle: [oops\n---\n").unwrap();
        let ctx = VaultContext::new(tmp.path());
        generator().generate_index(&ctx, &folder, false, false).await.unwrap();
        let text = fs::read_to_string(folder.join("Finance-Index.md")).unwrap();
        assert!(!text.contains("broken"));
        assert!(text.contains("Valuation Basics"));
    }

    #[tokio::test]
    async fn missing_folder_and_vault_root_errors() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let gen = generator();
        let err = gen
            .generate_index(&ctx, &tmp.path().join("Nope"), false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));

        let err = gen.generate_index(&ctx, tmp.path(), false, false).await.unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));
    }

    #[tokio::test]
    async fn tree_pass_counts_outcomes() {
        let tmp = vault();
        let ctx = VaultContext::new(tmp.path());
        let gen = generator();
        let fs_config = FilesystemConfig::default();

        let stats = gen.generate_tree(&ctx, &fs_config, false, false).await.unwrap();
        assert_eq!(stats.generated, 3);
        assert_eq!(stats.failed, 0);
        assert!(tmp.path().join("MBA/Finance/Investment/Investment-Index.md").exists());

        let stats = gen.generate_tree(&ctx, &fs_config, false, false).await.unwrap();
        assert_eq!(stats.generated, 0);
        assert_eq!(stats.unchanged, 3);
    }
}
