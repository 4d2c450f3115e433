//! Bounded asynchronous audit queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::logger::AuditWriter;
use super::record::AuditRecord;
use super::sink::AuditSink;

/// Queues records for a background writer.
///
/// `emit` never waits: when the queue is full or already shut down the record
/// is dropped and a local warning is logged. The worker runs on a blocking
/// thread so file writes never stall the async runtime.
pub struct AuditQueue {
    sender: RwLock<Option<mpsc::Sender<AuditRecord>>>,
    worker: Mutex<Option<JoinHandle<u64>>>,
    dropped: AtomicU64,
}

impl AuditQueue {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn<W: AuditWriter>(writer: W, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::task::spawn_blocking(move || drain(rx, writer));

        Self {
            sender: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Records dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting records and wait for queued ones to be written.
    ///
    /// Returns the number of records the worker wrote over its lifetime, or
    /// `None` if the drain did not finish within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Option<u64> {
        // Dropping the only sender closes the channel once it is drained.
        self.sender
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;

        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(written)) => {
                info!(written, dropped = self.dropped(), "Audit queue drained");
                Some(written)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Audit worker failed");
                None
            }
            Err(_) => {
                warn!(
                    "Audit drain timeout after {}s, pending records may be lost",
                    timeout.as_secs()
                );
                None
            }
        }
    }
}

impl AuditSink for AuditQueue {
    fn emit(&self, record: AuditRecord) {
        let sender = self.sender.read().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = sender.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Audit queue closed, dropping record");
            return;
        };

        if let Err(e) = tx.try_send(record) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(record) => warn!(
                    record_id = %record.record_id,
                    "Audit queue full, dropping record"
                ),
                TrySendError::Closed(record) => warn!(
                    record_id = %record.record_id,
                    "Audit worker gone, dropping record"
                ),
            }
        }
    }
}

fn drain<W: AuditWriter>(mut rx: mpsc::Receiver<AuditRecord>, mut writer: W) -> u64 {
    let mut written = 0;
    while let Some(record) = rx.blocking_recv() {
        match writer.write(&record) {
            Ok(()) => written += 1,
            Err(e) => warn!(
                error = %e,
                record_id = %record.record_id,
                "Failed to write audit record"
            ),
        }
    }
    if let Err(e) = writer.flush() {
        warn!(error = %e, "Failed to flush audit writer");
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEvent, AuditOutcome};
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<AuditRecord>>>);

    impl AuditWriter for Collect {
        fn write(&mut self, record: &AuditRecord) -> io::Result<()> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Failing;

    impl AuditWriter for Failing {
        fn write(&mut self, _record: &AuditRecord) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "backend down"))
        }
    }

    fn record() -> AuditRecord {
        AuditRecord::new(AuditEvent::Verify, AuditOutcome::Success, 0)
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_records() {
        let collected = Collect::default();
        let queue = AuditQueue::spawn(collected.clone(), 64);

        for _ in 0..10 {
            queue.emit(record());
        }

        let written = queue.shutdown(Duration::from_secs(5)).await;
        assert_eq!(written, Some(10));
        assert_eq!(collected.0.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_emit_after_shutdown_is_dropped() {
        let queue = AuditQueue::spawn(Collect::default(), 4);
        queue.shutdown(Duration::from_secs(5)).await;

        queue.emit(record());
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.shutdown(Duration::from_secs(1)).await, None);
    }

    #[tokio::test]
    async fn test_failing_backend_never_escalates() {
        let queue = AuditQueue::spawn(Failing, 4);
        queue.emit(record());
        queue.emit(record());
        assert_eq!(queue.shutdown(Duration::from_secs(5)).await, Some(0));
    }
}
