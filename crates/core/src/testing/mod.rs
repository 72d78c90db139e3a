//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the collection store and the QC backend; the harness
//! wires them to in-memory SQLite stores and a real [`TaskRunner`].
//!
//! # Example
//!
//! ```rust,ignore
//! use archivist_core::testing::{fixtures, TestHarness};
//!
//! let h = TestHarness::new()?;
//! h.storage.add_file("ingestion/b-1/data.h5").await;
//! h.batches().submit_batch(fixtures::submit_request("b-1", "carol")).await?;
//! h.drain(20).await;
//! ```
//!
//! [`TaskRunner`]: crate::orchestrator::TaskRunner

mod harness;
mod mock_qc;
mod mock_storage;

pub use harness::{HarnessOptions, TestHarness};
pub use mock_qc::{MockQcExecutor, RecordedSubmission};
pub use mock_storage::MockStorageGateway;

/// Test fixtures and helper functions.
pub mod fixtures {
    use sha2::{Digest, Sha256};

    use crate::batch::{ManifestEntry, SubmitBatchRequest};
    use crate::config::{AuthConfig, AutoApproveScope};
    use crate::orchestrator::OrchestratorConfig;
    use crate::order::CreateOrderRequest;

    /// Orchestrator settings with no waiting between steps.
    pub fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval_ms: 10,
            max_attempts: 3,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            qc_poll_interval_ms: 0,
            qc_max_polls_per_minute: 10_000,
            sweep_interval_ms: 50,
            ..Default::default()
        }
    }

    pub fn submit_request(batch_id: &str, submitted_by: &str) -> SubmitBatchRequest {
        SubmitBatchRequest {
            batch_id: batch_id.to_string(),
            submitted_by: submitted_by.to_string(),
            staging_path: Some(format!("/staging/{}", batch_id)),
            manifest: None,
        }
    }

    /// Manifest entry matching `contents` at `path`.
    pub fn manifest_entry(path: &str, contents: &[u8]) -> ManifestEntry {
        ManifestEntry {
            path: path.to_string(),
            size_bytes: contents.len() as u64,
            sha256: format!("{:x}", Sha256::digest(contents)),
        }
    }

    pub fn order_request(order_id: &str, requested_by: &str, items: &[&str]) -> CreateOrderRequest {
        CreateOrderRequest {
            order_id: order_id.to_string(),
            requested_by: requested_by.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Auto-approval on for the listed identities.
    pub fn auto_approve(privileged_users: &str, scope: AutoApproveScope) -> AuthConfig {
        AuthConfig {
            privileged_users: privileged_users.to_string(),
            auto_approve: true,
            auto_approve_scope: scope,
        }
    }
}
