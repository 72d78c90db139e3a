//! Append-only audit trail for batch and order lifecycles.
//!
//! Components emit through an [`AuditHandle`]; a single [`AuditWriter`] task
//! drains the channel into an [`AuditStore`].

mod events;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use events::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;
