//! Non-destructive hierarchy metadata reconciliation.
//!
//! [`reconcile`] folds a freshly detected [`HierarchyInfo`] into a document's
//! existing metadata. Only the fields the document's [`IndexType`] is
//! eligible for are considered, and a field that already holds a non-empty
//! value is left alone unless the caller forces an overwrite. Everything else
//! in the map passes through untouched, in its original order.
//!
//! [`MetadataService`] applies that merge to files on disk, one file at a
//! time or across a whole vault tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::config::FilesystemConfig;
use crate::error::{Result, VaultError};
use crate::frontmatter::{Metadata, MetadataStore, NoteDocument};
use crate::hierarchy::{self, HierarchyInfo, IndexType};
use crate::scan;
use crate::vault::VaultContext;

/// Frontmatter key holding a document's type (`program-index`, `pdf-reference`, ...).
pub const TYPE_KEY: &str = "type";

/// Merge `hierarchy` into `existing`.
///
/// Returns the updated map and whether anything changed. Empty computed
/// levels never clear an existing value.
pub fn reconcile(
    existing: &Metadata,
    hierarchy: &HierarchyInfo,
    index_type: IndexType,
    force_overwrite: bool,
) -> (Metadata, bool) {
    let mut updated = existing.clone();
    let mut changed = false;

    for field in index_type.eligible_fields() {
        let computed = hierarchy.get(*field);
        if computed.is_empty() {
            continue;
        }
        let key = field.key();
        let should_set = if updated.is_blank(key) {
            true
        } else {
            force_overwrite && updated.get_str(key) != Some(computed)
        };
        if should_set {
            updated.set_str(key, computed);
            changed = true;
        }
    }

    (updated, changed)
}

/// Index type of an existing document: its `type` key when that names an
/// index, otherwise content.
pub fn document_index_type(doc: &NoteDocument, path: &Path, vault_root: &Path) -> Result<IndexType> {
    let declared = doc
        .metadata
        .get_str(TYPE_KEY)
        .and_then(|t| t.parse::<IndexType>().ok())
        .filter(|t| t.is_index());
    match (declared, path.parent()) {
        (Some(_), Some(folder)) => hierarchy::classify_index_type(folder, vault_root, true),
        _ => hierarchy::classify_index_type(path, vault_root, false),
    }
}

/// Per-path async locks serializing read-modify-write on one document.
///
/// Different paths never contend. Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Registry size above which idle entries are pruned.
const PRUNE_THRESHOLD: usize = 1024;

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, m| Arc::strong_count(m) > 1);
            }
            map.entry(path.to_path_buf()).or_default().clone()
        };
        mutex.lock_owned().await
    }
}

/// Counters for a tree-wide metadata pass.
#[derive(Debug, Clone, Default)]
pub struct VaultWalkStats {
    pub scanned: u64,
    pub changed: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub failures: Vec<(PathBuf, String)>,
}

/// Applies [`reconcile`] to documents on disk.
pub struct MetadataService {
    store: Arc<dyn MetadataStore>,
    locks: PathLocks,
}

impl MetadataService {
    pub fn new(store: Arc<dyn MetadataStore>, locks: PathLocks) -> Self {
        Self { store, locks }
    }

    /// Bring one document's hierarchy metadata up to date.
    ///
    /// Returns whether the document changed (or would change, on a dry run).
    pub async fn ensure_metadata(
        &self,
        ctx: &VaultContext,
        path: &Path,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<bool> {
        let hierarchy = hierarchy::detect(path, ctx.vault_root())?;

        let _guard = self.locks.lock(path).await;
        let doc = self.store.read(path).await?;
        let index_type = document_index_type(&doc, path, ctx.vault_root())?;
        let (updated, changed) = reconcile(&doc.metadata, &hierarchy, index_type, force_overwrite);

        if !changed {
            debug!(path = %path.display(), "metadata already up to date");
            return Ok(false);
        }
        if dry_run {
            info!(path = %path.display(), index_type = %index_type, "would update metadata (dry run)");
            return Ok(true);
        }

        self.store.write_metadata(path, &updated).await?;
        info!(path = %path.display(), index_type = %index_type, "updated metadata");
        Ok(true)
    }

    /// Run [`ensure_metadata`](Self::ensure_metadata) on every document below
    /// `root`. Per-file failures are recorded and the walk continues; a
    /// missing `root` aborts.
    pub async fn ensure_metadata_tree(
        &self,
        ctx: &VaultContext,
        root: &Path,
        fs_config: &FilesystemConfig,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<VaultWalkStats> {
        if !ctx.vault_root().is_dir() {
            return Err(VaultError::NotFound(ctx.vault_root().to_path_buf()));
        }
        let files = scan::scan_documents(root, fs_config)?;

        let mut stats = VaultWalkStats::default();
        for path in files {
            stats.scanned += 1;
            match self.ensure_metadata(ctx, &path, force_overwrite, dry_run).await {
                Ok(true) => stats.changed += 1,
                Ok(false) => stats.unchanged += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping document");
                    stats.failed += 1;
                    stats.failures.push((path, e.to_string()));
                }
            }
        }
        Ok(stats)
    }
}
