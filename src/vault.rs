//! Vault context threaded through every operation.
//!
//! Operations never consult global state to find the vault: callers pass a
//! [`VaultContext`], and redirecting a run to a different vault means building
//! a new context with [`VaultContext::with_vault_root`]. Two batch runs over
//! different vaults can therefore share a process without interfering.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, VaultError};

/// Roots that locate documents for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultContext {
    vault_root: PathBuf,
    resources_root: Option<PathBuf>,
}

impl VaultContext {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self {
            vault_root: normalize(&vault_root.into()),
            resources_root: None,
        }
    }

    /// Attach the folder that holds source documents (PDFs, videos).
    pub fn with_resources_root(mut self, resources_root: impl Into<PathBuf>) -> Self {
        self.resources_root = Some(normalize(&resources_root.into()));
        self
    }

    /// A copy of this context pointing at a different vault.
    pub fn with_vault_root(&self, vault_root: impl Into<PathBuf>) -> Self {
        Self {
            vault_root: normalize(&vault_root.into()),
            resources_root: self.resources_root.clone(),
        }
    }

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    pub fn resources_root(&self) -> Option<&Path> {
        self.resources_root.as_deref()
    }

    /// Path of `path` relative to the vault root.
    pub fn relative(&self, path: &Path) -> Result<PathBuf> {
        relative_to(path, &self.vault_root)
    }

    /// Where the note for a source document lives inside the vault.
    ///
    /// Sources under the resources root keep their relative folder layout;
    /// anything else lands at the vault root. The extension becomes `.md`.
    pub fn note_path_for(&self, source: &Path) -> PathBuf {
        let source = normalize(source);
        let relative = self
            .resources_root
            .as_deref()
            .and_then(|root| source.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .or_else(|| source.file_name().map(PathBuf::from))
            .unwrap_or_default();
        self.vault_root.join(relative).with_extension("md")
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Strip `root` from `path`, failing when `path` lies outside it.
pub fn relative_to(path: &Path, root: &Path) -> Result<PathBuf> {
    let path = normalize(path);
    let root = normalize(root);
    path.strip_prefix(&root)
        .map(Path::to_path_buf)
        .map_err(|_| {
            VaultError::Validation(format!(
                "{} is not inside vault root {}",
                path.display(),
                root.display()
            ))
        })
}
