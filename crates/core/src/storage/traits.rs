use std::time::Duration;

use async_trait::async_trait;

use super::{DownloadTicket, StorageError, StoredFile};

/// The managed collection store.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Returns the name of this gateway implementation.
    fn name(&self) -> &str;

    /// Create a collection. Succeeds if it already exists.
    async fn create_collection(&self, path: &str) -> Result<(), StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Move every entry of `src` into the collection `dst`, then drop `src`.
    ///
    /// Succeeds without doing anything when `src` is gone and `dst` exists,
    /// which is what a previous completed move leaves behind.
    async fn move_entries(&self, src: &str, dst: &str) -> Result<(), StorageError>;

    /// Every file below the collection `path` with its size and digest,
    /// sorted by relative path. `NotFound` if the collection is missing.
    async fn list_files(&self, path: &str) -> Result<Vec<StoredFile>, StorageError>;

    /// Copy the entry at `src` (file or collection) into the collection `dst`,
    /// keeping its base name. Overwrites a previous partial copy.
    async fn copy_entry(&self, src: &str, dst: &str) -> Result<(), StorageError>;

    /// Issue a download ticket scoped to `path`, valid for `ttl`.
    async fn issue_ticket(&self, path: &str, ttl: Duration)
        -> Result<DownloadTicket, StorageError>;

    /// Remove a collection and revoke its tickets. Succeeds if already gone.
    async fn remove_collection(&self, path: &str) -> Result<(), StorageError>;
}
