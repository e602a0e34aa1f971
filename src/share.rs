//! Share-link collaborators.

use std::path::Path;

use async_trait::async_trait;

use crate::config::SharingConfig;
use crate::error::{Result, VaultError};

#[async_trait]
pub trait ShareLinkProvider: Send + Sync {
    /// Return the existing share link for `path`, creating one if needed.
    async fn get_or_create_share_link(&self, path: &Path) -> Result<String>;
}

/// Links to the source document on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalShareLinkProvider;

#[async_trait]
impl ShareLinkProvider for LocalShareLinkProvider {
    async fn get_or_create_share_link(&self, path: &Path) -> Result<String> {
        let absolute = tokio::fs::canonicalize(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(path.to_path_buf())
            } else {
                VaultError::io(path, e)
            }
        })?;
        Ok(file_url(&absolute))
    }
}

/// Provider selected by `[sharing]`, or `None` when sharing is disabled.
pub fn create_share_link_provider(config: &SharingConfig) -> Option<Box<dyn ShareLinkProvider>> {
    if config.is_enabled() {
        Some(Box::new(LocalShareLinkProvider))
    } else {
        None
    }
}

/// `file://` URL for an absolute path, percent-encoding spaces and the few
/// characters that break markdown links.
fn file_url(path: &Path) -> String {
    let mut url = String::from("file://");
    for c in path.to_string_lossy().replace('\\', "/").chars() {
        match c {
            ' ' => url.push_str("%20"),
            '#' => url.push_str("%23"),
            '%' => url.push_str("%25"),
            '(' => url.push_str("%28"),
            ')' => url.push_str("%29"),
            other => url.push(other),
        }
    }
    url
}
