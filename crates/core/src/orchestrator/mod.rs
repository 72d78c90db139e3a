//! Batch and order orchestration.
//!
//! - **Batches**: `Staged -> QcSubmitted -> QcPassed -> Promoted`, or out to `Rejected`
//! - **Orders**: `Requested -> Staged -> TicketIssued -> Fulfilled | Expired`
//! - **Runner**: worker pool executing queued tasks with bounded retries

mod batch;
mod config;
mod order;
mod runner;
mod types;
mod validation;

pub use batch::BatchOrchestrator;
pub use config::{OrchestratorConfig, RetryPolicy};
pub use order::OrderOrchestrator;
pub use runner::TaskRunner;
pub use types::{ErrorKind, OrchestratorError, OrchestratorStatus, Transition};
