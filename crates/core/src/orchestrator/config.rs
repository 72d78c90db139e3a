//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the batch and order orchestrators and their workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the worker pool.
    /// When disabled, the server only answers status queries.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of concurrent queue consumers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long an idle worker sleeps before polling the queue again (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Attempts per task before a retryable failure becomes terminal.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (milliseconds). Doubles on each attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound on the retry delay (milliseconds).
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Immediate re-evaluations after a lost compare-and-swap race.
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,

    /// Minimum interval between two polls of the same QC job (milliseconds).
    #[serde(default = "default_qc_poll_interval")]
    pub qc_poll_interval_ms: u64,

    /// Process-wide cap on QC backend polls per minute.
    #[serde(default = "default_qc_polls_per_minute")]
    pub qc_max_polls_per_minute: u32,

    /// A QC job still pending after this long fails the batch.
    #[serde(default = "default_qc_timeout")]
    pub qc_timeout_secs: u64,

    /// A submit claim without a backend job id older than this is abandoned.
    #[serde(default = "default_submit_claim_timeout")]
    pub submit_claim_timeout_secs: u64,

    /// Lifetime of an order download ticket (default: 2 days).
    #[serde(default = "default_ticket_ttl")]
    pub ticket_ttl_secs: u64,

    /// How long the ingestion data of a rejected, failed or cancelled batch
    /// is kept before the sweep removes it (default: 7 days).
    #[serde(default = "default_ingestion_retention")]
    pub ingestion_retention_secs: u64,

    /// How often the expiry and cleanup sweep runs (milliseconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    300_000 // 5 minutes
}

fn default_conflict_retries() -> u32 {
    3
}

fn default_qc_poll_interval() -> u64 {
    30_000
}

fn default_qc_polls_per_minute() -> u32 {
    60
}

fn default_qc_timeout() -> u64 {
    6 * 60 * 60
}

fn default_submit_claim_timeout() -> u64 {
    600
}

fn default_ticket_ttl() -> u64 {
    2 * 24 * 60 * 60
}

fn default_ingestion_retention() -> u64 {
    7 * 24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    60_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            conflict_retries: default_conflict_retries(),
            qc_poll_interval_ms: default_qc_poll_interval(),
            qc_max_polls_per_minute: default_qc_polls_per_minute(),
            qc_timeout_secs: default_qc_timeout(),
            submit_claim_timeout_secs: default_submit_claim_timeout(),
            ticket_ttl_secs: default_ticket_ttl(),
            ingestion_retention_secs: default_ingestion_retention(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

impl OrchestratorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base: Duration::from_millis(self.backoff_base_ms),
            max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.ticket_ttl_secs)
    }

    pub fn qc_poll_interval(&self) -> Duration {
        Duration::from_millis(self.qc_poll_interval_ms)
    }

    pub fn ingestion_retention(&self) -> Duration {
        Duration::from_secs(self.ingestion_retention_secs)
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` failed ones: `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
