use super::{check_key, ArtifactStore, OUTPUT_KEY};
use crate::runner::CaptureResult;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores artifacts as files in a directory and hands out `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        check_key(key)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::Storage(format!("cannot create {}: {}", self.dir.display(), e))
        })?;
        let path = self.dir.join(key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Storage(format!("cannot write {}: {}", path.display(), e)))?;
        debug!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        let path = self.write(key, &bytes).await?;
        let absolute = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| Error::Storage(format!("cannot resolve {}: {}", path.display(), e)))?;
        let url = url::Url::from_file_path(&absolute)
            .map_err(|_| Error::Storage(format!("no file URL for {}", absolute.display())))?;
        Ok(url.into())
    }

    async fn record_result(&self, result: &CaptureResult) -> Result<()> {
        let json = serde_json::to_vec_pretty(result)?;
        self.write(&format!("{}.json", OUTPUT_KEY), &json).await?;
        Ok(())
    }
}
