//! Collection store backed by a local directory tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CollectionLayout, DownloadTicket, StorageError, StorageGateway, StoredFile};

const DIGEST_CHUNK: usize = 64 * 1024;

/// Maps collections onto directories below a root.
///
/// Only paths under the configured top-level collections are reachable.
/// Issued tickets are held in memory.
pub struct FsStorageGateway {
    root: PathBuf,
    collections: Vec<String>,
    tickets: RwLock<HashMap<String, DownloadTicket>>,
}

impl FsStorageGateway {
    pub fn new(root: impl Into<PathBuf>, layout: &CollectionLayout) -> Self {
        Self {
            root: root.into(),
            collections: layout.collections().iter().map(|c| c.to_string()).collect(),
            tickets: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a logical path, refusing anything outside the known collections.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(StorageError::AccessDenied("empty path".to_string()));
        }

        let mut resolved = self.root.clone();
        for (i, segment) in trimmed.split('/').enumerate() {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StorageError::AccessDenied(path.to_string()));
            }
            if i == 0 && !self.collections.iter().any(|c| c == segment) {
                return Err(StorageError::AccessDenied(path.to_string()));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    async fn path_exists(logical: &str, path: &Path) -> Result<bool, StorageError> {
        fs::try_exists(path)
            .await
            .map_err(|e| StorageError::from_io(logical, e))
    }

    /// Check a ticket code against a requested path.
    pub async fn validate_ticket(&self, code: &str, path: &str) -> bool {
        let tickets = self.tickets.read().await;
        tickets
            .get(code)
            .is_some_and(|ticket| ticket.grants(path.trim_matches('/'), Utc::now()))
    }

    /// Number of tickets currently held, expired or not.
    pub async fn ticket_count(&self) -> usize {
        self.tickets.read().await.len()
    }

    /// Size and SHA-256 of one file, read in chunks.
    async fn digest(logical: &str, file: &Path) -> Result<(u64, String), StorageError> {
        let io = |e: std::io::Error| StorageError::from_io(logical, e);
        let mut reader = fs::File::open(file).await.map_err(io)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; DIGEST_CHUNK];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf).await.map_err(io)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok((size, format!("{:x}", hasher.finalize())))
    }

    async fn copy_tree(logical: &str, from: &Path, to: &Path) -> Result<(), StorageError> {
        let io = |e: std::io::Error| StorageError::from_io(logical, e);
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

        while let Some((src, dst)) = pending.pop() {
            fs::create_dir_all(&dst).await.map_err(io)?;
            let mut entries = fs::read_dir(&src).await.map_err(io)?;
            while let Some(entry) = entries.next_entry().await.map_err(io)? {
                let target = dst.join(entry.file_name());
                if entry.file_type().await.map_err(io)?.is_dir() {
                    pending.push((entry.path(), target));
                } else {
                    fs::copy(entry.path(), &target).await.map_err(io)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageGateway for FsStorageGateway {
    fn name(&self) -> &str {
        "fs"
    }

    async fn create_collection(&self, path: &str) -> Result<(), StorageError> {
        let resolved = self.resolve(path)?;
        match fs::metadata(&resolved).await {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(StorageError::PathConflict {
                    path: path.to_string(),
                    reason: "a file exists at this path".to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::from_io(path, e)),
        }
        fs::create_dir_all(&resolved)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        debug!("Created collection {}", path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let resolved = self.resolve(path)?;
        Self::path_exists(path, &resolved).await
    }

    async fn move_entries(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        let src_path = self.resolve(src)?;
        let dst_path = self.resolve(dst)?;

        if !Self::path_exists(src, &src_path).await? {
            return if Self::path_exists(dst, &dst_path).await? {
                debug!("Move {} -> {} already applied", src, dst);
                Ok(())
            } else {
                Err(StorageError::NotFound(src.to_string()))
            };
        }

        fs::create_dir_all(&dst_path)
            .await
            .map_err(|e| StorageError::from_io(dst, e))?;

        let io = |e: std::io::Error| StorageError::from_io(src, e);
        let mut entries = fs::read_dir(&src_path).await.map_err(io)?;
        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            let target = dst_path.join(entry.file_name());
            if Self::path_exists(dst, &target).await? {
                return Err(StorageError::PathConflict {
                    path: format!("{}/{}", dst, entry.file_name().to_string_lossy()),
                    reason: "destination entry already exists".to_string(),
                });
            }
            fs::rename(entry.path(), &target).await.map_err(io)?;
        }

        match fs::remove_dir(&src_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::from_io(src, e)),
        }
        debug!("Moved entries {} -> {}", src, dst);
        Ok(())
    }

    async fn list_files(&self, path: &str) -> Result<Vec<StoredFile>, StorageError> {
        let root = self.resolve(path)?;
        let io = |e: std::io::Error| StorageError::from_io(path, e);

        if !fs::metadata(&root).await.map_err(io)?.is_dir() {
            return Err(StorageError::PathConflict {
                path: path.to_string(),
                reason: "not a collection".to_string(),
            });
        }

        let mut files = Vec::new();
        let mut pending = vec![(root, String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(io)?;
            while let Some(entry) = entries.next_entry().await.map_err(io)? {
                let name = format!("{}{}", prefix, entry.file_name().to_string_lossy());
                if entry.file_type().await.map_err(io)?.is_dir() {
                    pending.push((entry.path(), format!("{}/", name)));
                } else {
                    let (size_bytes, sha256) = Self::digest(path, &entry.path()).await?;
                    files.push(StoredFile {
                        path: name,
                        size_bytes,
                        sha256,
                    });
                }
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn copy_entry(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        let src_path = self.resolve(src)?;
        let dst_path = self.resolve(dst)?;

        let meta = fs::metadata(&src_path)
            .await
            .map_err(|e| StorageError::from_io(src, e))?;
        let name = src_path
            .file_name()
            .ok_or_else(|| StorageError::AccessDenied(src.to_string()))?;
        let target = dst_path.join(name);

        fs::create_dir_all(&dst_path)
            .await
            .map_err(|e| StorageError::from_io(dst, e))?;

        if meta.is_dir() {
            Self::copy_tree(src, &src_path, &target).await?;
        } else {
            fs::copy(&src_path, &target)
                .await
                .map_err(|e| StorageError::from_io(src, e))?;
        }
        debug!("Copied {} into {}", src, dst);
        Ok(())
    }

    async fn issue_ticket(
        &self,
        path: &str,
        ttl: Duration,
    ) -> Result<DownloadTicket, StorageError> {
        let resolved = self.resolve(path)?;
        if !Self::path_exists(path, &resolved).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| StorageError::Unavailable(format!("ticket ttl out of range: {:?}", ttl)))?;
        let issued_at = Utc::now();
        let seed = format!("{}:{}", uuid::Uuid::new_v4(), path);
        let code = format!("{:x}", Sha256::digest(seed.as_bytes()));

        let ticket = DownloadTicket {
            code: code.clone(),
            path: path.trim_matches('/').to_string(),
            issued_at,
            expires_at: issued_at + ttl,
        };
        self.tickets.write().await.insert(code, ticket.clone());
        Ok(ticket)
    }

    async fn remove_collection(&self, path: &str) -> Result<(), StorageError> {
        let resolved = self.resolve(path)?;
        match fs::remove_dir_all(&resolved).await {
            Ok(()) => debug!("Removed collection {}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::from_io(path, e)),
        }

        let scope = path.trim_matches('/');
        let nested = format!("{}/", scope);
        self.tickets
            .write()
            .await
            .retain(|_, ticket| ticket.path != scope && !ticket.path.starts_with(&nested));
        Ok(())
    }
}
