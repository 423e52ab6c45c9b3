//! Object storage for archived messages.
//!
//! Every message the ear hears ends up as one object under
//! `<world_instance_alias>/eventstore/<YYYYMMDD>/`. Production ears write to
//! S3; development ears can point at a local directory instead.

mod fs;
mod s3;

use async_trait::async_trait;

use crate::config::{EarSettings, StoreKind};
use crate::error::Result;

pub use fs::FsStore;
pub use s3::S3Store;

/// A flat key/value object store.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Short name of the backend, for logs.
    fn name(&self) -> &'static str;

    /// Store `body` under `key`, replacing anything already there.
    ///
    /// # Errors
    ///
    /// Returns an error if the object could not be written.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Total size in bytes of all objects whose key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the objects could not be listed.
    async fn folder_size(&self, prefix: &str) -> Result<u64>;
}

/// Build the object store selected in the settings.
///
/// # Errors
///
/// Returns an error if the backend cannot be initialised.
pub async fn open_store(settings: &EarSettings) -> Result<Box<dyn ObjectStore>> {
    match settings.store.kind {
        StoreKind::S3 => Ok(Box::new(S3Store::connect(&settings.store).await)),
        StoreKind::Filesystem => Ok(Box::new(FsStore::open(settings.store_root())?)),
    }
}
