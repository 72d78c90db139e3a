use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

/// Most events written per transaction.
const MAX_BATCH: usize = 64;

/// Single consumer of the audit channel.
///
/// Whatever is queued when it wakes up is written in one transaction. A
/// failed write is logged and the events are dropped; lifecycle work never
/// waits on the audit trail. The writer returns once every [`AuditHandle`]
/// is gone and the channel is empty.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub async fn run(mut self) {
        info!("Audit writer started");
        let mut pending = Vec::with_capacity(MAX_BATCH);
        let mut written = 0usize;
        let mut dropped = 0usize;

        while self.rx.recv_many(&mut pending, MAX_BATCH).await > 0 {
            let records: Vec<AuditRecord> = pending.drain(..).map(AuditRecord::from).collect();
            match self.store.append(&records) {
                Ok(n) => {
                    debug!(count = n, "Audit events written");
                    written += n;
                }
                Err(e) => {
                    error!(count = records.len(), "Failed to write audit events: {}", e);
                    dropped += records.len();
                }
            }
        }

        info!(written, dropped, "Audit writer stopped");
    }
}

/// Channel, handle and writer. Spawn `writer.run()` and clone the handle
/// into every component that emits.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter { rx, store })
}
