//! Media storage
//!
//! Uploaded files live under the configured upload directory and are
//! addressed publicly as `<public_prefix>/<relative path>`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::UploadConfig;
use crate::db::repositories::{PageRepository, PostRepository};

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Delete the file behind a public URL.
    ///
    /// Returns `Ok(false)` when the URL is not managed by this store or the
    /// file is already gone.
    async fn remove(&self, url: &str) -> Result<bool>;
}

/// Media store backed by a local directory
pub struct FsMediaStore {
    root: PathBuf,
    public_prefix: String,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let prefix: String = public_prefix.into();
        Self {
            root: root.into(),
            public_prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Arc<dyn MediaStore> {
        Arc::new(Self::new(&config.path, &config.public_prefix))
    }

    /// Map a public URL to a file below the root, refusing anything that
    /// would escape it
    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let path = match url.find("://") {
            Some(scheme_end) => {
                let rest = &url[scheme_end + 3..];
                &rest[rest.find('/')?..]
            }
            None => url,
        };
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let relative = path.strip_prefix(&self.public_prefix)?.strip_prefix('/')?;
        let decoded = urlencoding::decode(relative).ok()?;

        let relative = Path::new(decoded.as_ref());
        if relative.as_os_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn remove(&self, url: &str) -> Result<bool> {
        let Some(path) = self.resolve(url) else {
            debug!(url, "Media URL is not managed by the upload store");
            return Ok(false);
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed media file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove media file {}", path.display())),
        }
    }
}

/// Remove every file in `urls` that no remaining post or page links to.
///
/// Runs after the owning row is gone, so failures are only logged.
pub async fn remove_unreferenced(
    media: &dyn MediaStore,
    posts: &dyn PostRepository,
    pages: &dyn PageRepository,
    urls: impl IntoIterator<Item = String>,
) {
    let mut seen = std::collections::HashSet::new();
    for url in urls {
        if url.trim().is_empty() || !seen.insert(url.clone()) {
            continue;
        }
        let shared = match (posts.references_media(&url, None).await, pages.references_media(&url).await) {
            (Ok(in_posts), Ok(in_pages)) => in_posts || in_pages,
            (Err(e), _) | (_, Err(e)) => {
                warn!(url, "Skipping media cleanup: {:#}", e);
                continue;
            }
        };
        if shared {
            debug!(url, "Media still referenced, keeping file");
            continue;
        }
        match media.remove(&url).await {
            Ok(removed) => debug!(url, removed, "Media cleanup"),
            Err(e) => warn!(url, "Failed to remove media file: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2024")).unwrap();
        std::fs::write(dir.path().join("2024/cover image.png"), b"png").unwrap();

        let store = FsMediaStore::new(dir.path(), "/uploads");
        assert!(store.remove("/uploads/2024/cover%20image.png").await.unwrap());
        assert!(!dir.path().join("2024/cover image.png").exists());

        // already gone
        assert!(!store.remove("/uploads/2024/cover%20image.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_absolute_url_is_mapped_by_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"jpg").unwrap();

        let store = FsMediaStore::new(dir.path(), "/uploads/");
        assert!(store.remove("https://cdn.example.com/uploads/a.jpg?v=2").await.unwrap());
    }

    #[test]
    fn test_resolve_rejects_foreign_and_traversal_urls() {
        let store = FsMediaStore::new("/srv/uploads", "/uploads");
        assert!(store.resolve("/images/a.jpg").is_none());
        assert!(store.resolve("/uploads/../secret").is_none());
        assert!(store.resolve("/uploads/%2e%2e/secret").is_none());
        assert!(store.resolve("/uploads/").is_none());
        assert!(store.resolve("/uploadsx/a.jpg").is_none());
        assert_eq!(
            store.resolve("/uploads/a/b.png").unwrap(),
            PathBuf::from("/srv/uploads/a/b.png")
        );
    }
}
