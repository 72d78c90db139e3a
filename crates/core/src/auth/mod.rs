//! Privileged-identity registry and its persisted form.

mod registry;
mod store;

pub use registry::{AuthorizationRegistry, SyncReport};
pub use store::{PrivilegedUser, PrivilegedUserStore, SqlitePrivilegedUserStore, UserStoreError};
