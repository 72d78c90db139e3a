use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;

/// Time-boxed credential granting read access to one collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadTicket {
    pub code: String,
    /// Collection the ticket is scoped to.
    pub path: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DownloadTicket {
    /// Expired strictly after `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether the ticket grants access to `path` at `now`.
    pub fn grants(&self, path: &str, now: DateTime<Utc>) -> bool {
        if self.is_expired_at(now) {
            return false;
        }
        path == self.path
            || path
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// A file inside a collection, as found on storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredFile {
    /// Slash-separated path relative to the listed collection.
    pub path: String,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the contents.
    pub sha256: String,
}

/// Where batches and orders live inside the collection store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionLayout {
    pub ingestion: String,
    pub production: String,
    pub orders: String,
}

impl CollectionLayout {
    pub fn ingestion_path(&self, batch_id: &str) -> String {
        format!("{}/{}", self.ingestion, batch_id)
    }

    pub fn production_path(&self, batch_id: &str) -> String {
        format!("{}/{}", self.production, batch_id)
    }

    pub fn order_path(&self, order_id: &str) -> String {
        format!("{}/{}", self.orders, order_id)
    }

    /// Production path of an ordered item, given relative to the production root.
    pub fn production_item(&self, item: &str) -> String {
        format!("{}/{}", self.production, item.trim_start_matches('/'))
    }

    pub fn collections(&self) -> [&str; 3] {
        [&self.ingestion, &self.production, &self.orders]
    }
}

impl From<&StorageConfig> for CollectionLayout {
    fn from(config: &StorageConfig) -> Self {
        Self {
            ingestion: config.ingestion_collection.trim().to_string(),
            production: config.production_collection.trim().to_string(),
            orders: config.orders_collection.trim().to_string(),
        }
    }
}

impl Default for CollectionLayout {
    fn default() -> Self {
        Self {
            ingestion: "ingestion".to_string(),
            production: "production".to_string(),
            orders: "orders".to_string(),
        }
    }
}
