//! Batch records, their lifecycle states and QC job bookkeeping.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteBatchStore;
pub use store::BatchStore;
pub use types::{
    Batch, BatchFilter, BatchManifest, BatchState, ManifestEntry, QcJob, QcJobResult,
    SubmitBatchRequest,
};
