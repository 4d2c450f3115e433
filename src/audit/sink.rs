//! Audit sink interface and simple implementations.

use std::sync::Mutex;

use super::record::AuditRecord;

/// Fire-and-forget destination for audit records.
///
/// Implementations must not block and must not fail the caller.
pub trait AuditSink: Send + Sync {
    fn emit(&self, record: AuditRecord);
}

/// A sink that discards everything, for when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn emit(&self, _record: AuditRecord) {}
}

/// Keeps records in memory. Useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records emitted so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}
