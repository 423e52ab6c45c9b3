//! Local cache of messages that still need to be put in the object store.
//!
//! Files are named exactly like the objects they become, so flushing the cache
//! is a straight copy into the current daily folder.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Extensions of archived payloads.
const PAYLOAD_EXTENSIONS: &[&str] = &["json", "txt"];

/// A directory of payloads awaiting upload.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    /// Open the cache at `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a payload to the cache.
    ///
    /// With `flush_first`, every cached payload is deleted before writing, so
    /// the cache only ever holds the newest message. Dev universes use this.
    ///
    /// Returns the names of the payloads that were flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be flushed or written.
    pub fn store(&self, file_name: &str, payload: &[u8], flush_first: bool) -> Result<Vec<String>> {
        let flushed = if flush_first { self.flush()? } else { Vec::new() };
        if !flushed.is_empty() {
            debug!(
                "dev world, so flushed {} old files from {}",
                flushed.len(),
                self.dir.display()
            );
        }

        let path = self.dir.join(file_name);
        std::fs::write(&path, payload).map_err(|e| Error::cache(&path, e))?;
        debug!("wrote to {}", path.display());
        Ok(flushed)
    }

    /// Names of cached payloads, sorted (which is also arrival order for one
    /// sender and type).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn pending(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(|e| Error::cache(&self.dir, e))? {
            let entry = entry.map_err(|e| Error::cache(&self.dir, e))?;
            let path = entry.path();
            if path.is_file() && is_payload(&path) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a cached payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(file_name);
        std::fs::read(&path).map_err(|e| Error::cache(&path, e))
    }

    /// Remove a cached payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, file_name: &str) -> Result<()> {
        let path = self.dir.join(file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::cache(&path, e)),
        }
    }

    /// Number of cached payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn len(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    /// Whether the cache is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Total size of cached payloads in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file's metadata cannot be read.
    pub fn size_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for name in self.pending()? {
            let path = self.dir.join(&name);
            total += std::fs::metadata(&path)
                .map_err(|e| Error::cache(&path, e))?
                .len();
        }
        Ok(total)
    }

    /// Delete every cached payload. Returns the removed names.
    fn flush(&self) -> Result<Vec<String>> {
        let names = self.pending()?;
        for name in &names {
            self.remove(name)?;
        }
        Ok(names)
    }
}

fn is_payload(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PAYLOAD_EXTENSIONS.contains(&ext))
}
