//! Audit event emission.
//!
//! The pipeline hands every generate/verify/refresh/revoke outcome to an
//! [`AuditSink`]. Emission is fire-and-forget: a slow or failing backend can
//! neither delay nor fail a token operation.
//!
//! ## Features
//!
//! - Structured records with a redacted token prefix and a reason code
//! - A bounded queue drained by a background worker ([`AuditQueue`])
//! - JSON lines file output ([`JsonLinesAuditLog`])
//! - Graceful drain of queued records at shutdown

mod logger;
mod queue;
mod record;
mod sanitize;
mod sink;

pub use logger::{AuditWriter, JsonLinesAuditLog, TracingAuditLog};
pub use queue::AuditQueue;
pub use record::{AuditEvent, AuditOutcome, AuditRecord};
pub use sanitize::redact_token;
pub use sink::{AuditSink, MemoryAuditSink, NullAuditSink};
