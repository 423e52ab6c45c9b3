//! Local directory backend, used in development and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::ObjectStore;
use crate::error::{Error, Result};

const STORE_NAME: &str = "filesystem";

/// Object store that maps keys to files under a root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| Error::DirectoryCreate {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path on disk for a key. Keys never escape the root.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.split('/').any(|part| part == "..") {
            return Err(Error::object_store(STORE_NAME, key, "key escapes the store root"));
        }
        Ok(self.root.join(key.trim_start_matches('/')))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::object_store(STORE_NAME, key, e.to_string()))?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Error::object_store(STORE_NAME, key, e.to_string()))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn folder_size(&self, prefix: &str) -> Result<u64> {
        let dir = self.path_for(prefix)?;
        let mut total = 0;
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::object_store(STORE_NAME, prefix, e.to_string())),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::object_store(STORE_NAME, prefix, e.to_string()))?
            {
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| Error::object_store(STORE_NAME, prefix, e.to_string()))?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}
