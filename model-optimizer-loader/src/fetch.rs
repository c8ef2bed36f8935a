//! Asset fetchers

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use model_optimizer_core::{AssetFetcher, OptimizerError, Result};

/// Local path for a plain path or `file://` URL; `None` for other schemes
pub fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if url.contains("://") {
        return None;
    }
    Some(PathBuf::from(url))
}

/// Reads assets from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    base_dir: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf> {
        let path = local_path(url)
            .ok_or_else(|| OptimizerError::load(url, "unsupported URL scheme"))?;
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }
}

#[async_trait]
impl AssetFetcher for FileFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let path = self.resolve(url)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| OptimizerError::load(url, format!("{}: {}", path.display(), e)))?;
        debug!("Read {} bytes from {}", data.len(), path.display());
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("models/chair.glb"), Some(PathBuf::from("models/chair.glb")));
        assert_eq!(local_path("file:///tmp/a.glb"), Some(PathBuf::from("/tmp/a.glb")));
        assert_eq!(local_path("https://cdn.example.com/a.glb"), None);
    }

    #[tokio::test]
    async fn test_fetch_from_base_dir() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("model.glb"), b"glTF").await.unwrap();

        let fetcher = FileFetcher::with_base_dir(dir.path());
        let bytes = fetcher.fetch("model.glb").await.unwrap();
        assert_eq!(&bytes[..], b"glTF");
    }

    #[tokio::test]
    async fn test_missing_file_names_url() {
        let err = FileFetcher::new().fetch("does/not/exist.glb").await.unwrap_err();
        assert!(matches!(err, OptimizerError::Load { .. }));
        assert!(err.to_string().contains("does/not/exist.glb"));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let err = FileFetcher::new()
            .fetch("https://cdn.example.com/a.glb")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("https://cdn.example.com/a.glb"));
    }
}
