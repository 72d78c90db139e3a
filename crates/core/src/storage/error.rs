use thiserror::Error;

/// Errors returned by a storage gateway.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Backend unreachable or failed transiently. Safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Destination already holds different content.
    #[error("path conflict at {path}: {reason}")]
    PathConflict { path: String, reason: String },

    #[error("path not found: {0}")]
    NotFound(String),

    /// Path escapes the store or is outside the configured collections.
    #[error("access denied: {0}")]
    AccessDenied(String),
}

impl StorageError {
    pub(crate) fn from_io(path: &str, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                StorageError::AccessDenied(format!("{}: {}", path, e))
            }
            _ => StorageError::Unavailable(format!("{}: {}", path, e)),
        }
    }
}
