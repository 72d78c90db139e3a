//! Collection store access.
//!
//! Collections are addressed by logical, slash-separated paths relative to
//! the store root (e.g. `ingestion/batch-1`). Every operation is idempotent
//! so handlers can be replayed after a crash.

mod error;
mod fs_gateway;
mod traits;
mod types;

pub use error::StorageError;
pub use fs_gateway::FsStorageGateway;
pub use traits::StorageGateway;
pub use types::{CollectionLayout, DownloadTicket, StoredFile};
