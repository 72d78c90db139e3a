//! Mock storage gateway for testing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::storage::{DownloadTicket, StorageError, StorageGateway, StoredFile};

/// In-memory collection store.
///
/// Paths are kept in a flat set; a path exists if it was added or anything
/// below it was. Only paths added as files are listed by `list_files`.
/// Every call is recorded as `"<op>:<path>"` for assertions.
///
/// # Example
///
/// ```rust,ignore
/// let storage = MockStorageGateway::new();
/// storage.add_file("ingestion/b-1/data.h5").await;
///
/// assert!(storage.exists("ingestion/b-1").await?);
/// storage.fail_next(StorageError::Unavailable("down".into())).await;
/// ```
#[derive(Debug, Default)]
pub struct MockStorageGateway {
    paths: Arc<RwLock<BTreeSet<String>>>,
    /// File contents, keyed by full path. Locked after `paths`.
    files: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    calls: Arc<RwLock<Vec<String>>>,
    tickets: Arc<RwLock<Vec<DownloadTicket>>>,
    /// Consumed by the next operation.
    next_error: Arc<RwLock<Option<StorageError>>>,
    /// Returned by every operation until cleared.
    persistent_error: Arc<RwLock<Option<StorageError>>>,
}

impl MockStorageGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_file(&self, path: &str) {
        self.add_file_with(path, b"").await;
    }

    pub async fn add_file_with(&self, path: &str, contents: &[u8]) {
        self.paths.write().await.insert(path.to_string());
        self.files
            .write()
            .await
            .insert(path.to_string(), contents.to_vec());
    }

    pub async fn add_collection(&self, path: &str) {
        self.paths.write().await.insert(path.to_string());
    }

    /// Whether `path` itself or anything below it is present.
    pub async fn has(&self, path: &str) -> bool {
        Self::contains(&*self.paths.read().await, path)
    }

    pub async fn paths(&self) -> Vec<String> {
        self.paths.read().await.iter().cloned().collect()
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    /// Recorded calls for one operation, e.g. `"exists"`.
    pub async fn calls_to(&self, op: &str) -> Vec<String> {
        let prefix = format!("{}:", op);
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub async fn issued_tickets(&self) -> Vec<DownloadTicket> {
        self.tickets.read().await.clone()
    }

    pub async fn fail_next(&self, error: StorageError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn fail_always(&self, error: StorageError) {
        *self.persistent_error.write().await = Some(error);
    }

    pub async fn clear_failures(&self) {
        *self.next_error.write().await = None;
        *self.persistent_error.write().await = None;
    }

    /// Re-key every file below `src` to sit below `dst`, keeping or dropping the originals.
    async fn relocate_files(&self, src: &str, dst: &str, keep: bool) {
        let nested = format!("{}/", src);
        let mut files = self.files.write().await;
        let moved: Vec<(String, Vec<u8>)> = files
            .iter()
            .filter_map(|(p, data)| {
                if p == src {
                    Some((dst.to_string(), data.clone()))
                } else {
                    p.strip_prefix(&nested)
                        .map(|rest| (format!("{}/{}", dst, rest), data.clone()))
                }
            })
            .collect();
        if !keep {
            files.retain(|p, _| p != src && !p.starts_with(&nested));
        }
        files.extend(moved);
    }

    fn contains(paths: &BTreeSet<String>, path: &str) -> bool {
        let nested = format!("{}/", path);
        paths.iter().any(|p| p == path || p.starts_with(&nested))
    }

    async fn enter(&self, op: &str, path: &str) -> Result<(), StorageError> {
        self.calls.write().await.push(format!("{}:{}", op, path));
        if let Some(e) = self.next_error.write().await.take() {
            return Err(e);
        }
        if let Some(ref e) = *self.persistent_error.read().await {
            return Err(e.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl StorageGateway for MockStorageGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_collection(&self, path: &str) -> Result<(), StorageError> {
        self.enter("create_collection", path).await?;
        self.paths.write().await.insert(path.to_string());
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.enter("exists", path).await?;
        Ok(self.has(path).await)
    }

    async fn move_entries(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        self.enter("move_entries", src).await?;
        let mut paths = self.paths.write().await;

        if !Self::contains(&paths, src) {
            return if Self::contains(&paths, dst) {
                Ok(())
            } else {
                Err(StorageError::NotFound(src.to_string()))
            };
        }

        let nested = format!("{}/", src);
        let moved: Vec<String> = paths
            .iter()
            .filter(|p| *p == src || p.starts_with(&nested))
            .cloned()
            .collect();
        for path in moved {
            paths.remove(&path);
            if let Some(rest) = path.strip_prefix(&nested) {
                paths.insert(format!("{}/{}", dst, rest));
            }
        }
        paths.insert(dst.to_string());
        self.relocate_files(src, dst, false).await;
        Ok(())
    }

    async fn copy_entry(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        self.enter("copy_entry", src).await?;
        let mut paths = self.paths.write().await;

        if !Self::contains(&paths, src) {
            return Err(StorageError::NotFound(src.to_string()));
        }

        let base = src.rsplit('/').next().unwrap_or(src);
        let nested = format!("{}/", src);
        let copied: Vec<String> = paths
            .iter()
            .filter_map(|p| {
                if p == src {
                    Some(format!("{}/{}", dst, base))
                } else {
                    p.strip_prefix(&nested)
                        .map(|rest| format!("{}/{}/{}", dst, base, rest))
                }
            })
            .collect();
        paths.extend(copied);
        paths.insert(dst.to_string());
        self.relocate_files(src, &format!("{}/{}", dst, base), true)
            .await;
        Ok(())
    }

    async fn list_files(&self, path: &str) -> Result<Vec<StoredFile>, StorageError> {
        self.enter("list_files", path).await?;
        if !self.has(path).await {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let nested = format!("{}/", path);
        let files = self.files.read().await;
        Ok(files
            .iter()
            .filter_map(|(p, data)| {
                p.strip_prefix(&nested).map(|rest| StoredFile {
                    path: rest.to_string(),
                    size_bytes: data.len() as u64,
                    sha256: format!("{:x}", Sha256::digest(data)),
                })
            })
            .collect())
    }

    async fn issue_ticket(&self, path: &str, ttl: Duration) -> Result<DownloadTicket, StorageError> {
        self.enter("issue_ticket", path).await?;
        if !self.has(path).await {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let mut tickets = self.tickets.write().await;
        let issued_at = Utc::now();
        let ticket = DownloadTicket {
            code: format!("mock-ticket-{}", tickets.len() + 1),
            path: path.to_string(),
            issued_at,
            expires_at: issued_at
                + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(2)),
        };
        tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn remove_collection(&self, path: &str) -> Result<(), StorageError> {
        self.enter("remove_collection", path).await?;
        let nested = format!("{}/", path);
        self.paths
            .write()
            .await
            .retain(|p| p != path && !p.starts_with(&nested));
        self.files
            .write()
            .await
            .retain(|p, _| p != path && !p.starts_with(&nested));
        self.tickets.write().await.retain(|t| t.path != path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_then_replay() {
        let storage = MockStorageGateway::new();
        storage.add_file("ingestion/b-1/a.h5").await;
        storage.add_file("ingestion/b-1/sub/b.h5").await;

        storage.move_entries("ingestion/b-1", "production/b-1").await.unwrap();
        assert!(storage.has("production/b-1/a.h5").await);
        assert!(storage.has("production/b-1/sub/b.h5").await);
        assert!(!storage.has("ingestion/b-1").await);

        // Replaying a completed move succeeds.
        storage.move_entries("ingestion/b-1", "production/b-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_keeps_base_name() {
        let storage = MockStorageGateway::new();
        storage.add_file("production/b-1/a.h5").await;

        storage.copy_entry("production/b-1", "orders/o-1").await.unwrap();
        assert!(storage.has("orders/o-1/b-1/a.h5").await);
        assert!(storage.has("production/b-1/a.h5").await);

        let err = storage.copy_entry("production/nope", "orders/o-1").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(p) if p == "production/nope"));
    }

    #[tokio::test]
    async fn test_listed_files_follow_moves() {
        let storage = MockStorageGateway::new();
        storage.add_file_with("ingestion/b-1/a.h5", b"abc").await;
        storage.add_file("ingestion/b-1/sub/b.h5").await;

        let files = storage.list_files("ingestion/b-1").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "a.h5");
        assert_eq!(files[0].size_bytes, 3);
        assert_eq!(files[1].path, "sub/b.h5");

        storage.move_entries("ingestion/b-1", "production/b-1").await.unwrap();
        assert!(matches!(
            storage.list_files("ingestion/b-1").await,
            Err(StorageError::NotFound(_))
        ));
        let moved = storage.list_files("production/b-1").await.unwrap();
        assert_eq!(moved[0].sha256, files[0].sha256);
    }

    #[tokio::test]
    async fn test_failures_and_recorded_calls() {
        let storage = MockStorageGateway::new();
        storage
            .fail_next(StorageError::Unavailable("blip".to_string()))
            .await;

        assert!(storage.exists("ingestion/x").await.is_err());
        assert!(!storage.exists("ingestion/x").await.unwrap());
        assert_eq!(storage.calls_to("exists").await.len(), 2);
    }
}
