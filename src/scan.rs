//! Vault and resource directory walks.
//!
//! Discovers the markdown documents a metadata pass touches, the folders an
//! index pass visits, and the source documents a processing run enqueues.
//! Results are sorted so every run visits paths in the same order.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

use crate::config::FilesystemConfig;
use crate::error::{Result, VaultError};

const DEFAULT_EXCLUDES: [&str; 4] = [
    "**/.git/**",
    "**/.obsidian/**",
    "**/.trash/**",
    "**/node_modules/**",
];

/// Markdown (or otherwise included) documents below `root`.
pub fn scan_documents(root: &Path, fs_config: &FilesystemConfig) -> Result<Vec<PathBuf>> {
    ensure_root(root)?;

    let include_set = build_globset(&fs_config.include_globs)?;
    let exclude_set = exclude_globset(fs_config)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(fs_config.follow_symlinks)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel_str = relative_str(path, root);

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        // Apply include patterns
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Every non-hidden folder strictly below `root`, parents before children.
pub fn scan_folders(root: &Path, fs_config: &FilesystemConfig) -> Result<Vec<PathBuf>> {
    ensure_root(root)?;
    let exclude_set = exclude_globset(fs_config)?;

    let mut folders = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(fs_config.follow_symlinks)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if exclude_set.is_match(relative_str(entry.path(), root)) {
            continue;
        }
        folders.push(entry.into_path());
    }

    folders.sort();
    Ok(folders)
}

/// Source documents below `root` whose extension is one of `extensions`
/// (compared case-insensitively, without the dot).
pub fn scan_sources(root: &Path, extensions: &[&str], follow_symlinks: bool) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    ensure_root(root)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn ensure_root(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(VaultError::NotFound(root.to_path_buf()));
    }
    Ok(())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn relative_str(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

fn walk_error(root: &Path, e: walkdir::Error) -> VaultError {
    let path = e.path().unwrap_or(root).to_path_buf();
    let source = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    VaultError::io(path, source)
}

fn exclude_globset(fs_config: &FilesystemConfig) -> Result<GlobSet> {
    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend(fs_config.exclude_globs.iter().cloned());
    build_globset(&patterns)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| VaultError::Validation(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| VaultError::Validation(format!("invalid glob set: {}", e)))
}
