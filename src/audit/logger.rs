//! Audit writers used by the background queue.
//!
//! Writes structured audit records as JSON lines (one JSON object per line)
//! for easy parsing by log analysis tools.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::record::{AuditOutcome, AuditRecord};

/// Backend the [`super::AuditQueue`] worker drains into.
///
/// Runs on a dedicated blocking thread, so implementations may do file I/O.
pub trait AuditWriter: Send + 'static {
    fn write(&mut self, record: &AuditRecord) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Appends audit records to a file in JSON lines format.
pub struct JsonLinesAuditLog {
    file: File,
    path: PathBuf,
}

impl JsonLinesAuditLog {
    /// Open (or create) the log at `path` in append mode.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - File cannot be opened for appending
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "Audit log opened");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the audit log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditWriter for JsonLinesAuditLog {
    fn write(&mut self, record: &AuditRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)?;
        writeln!(self.file, "{}", json)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if let Err(e) = self.file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }
        Ok(())
    }
}

/// Forwards audit records to the `tracing` subscriber under the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditLog;

impl AuditWriter for TracingAuditLog {
    fn write(&mut self, record: &AuditRecord) -> io::Result<()> {
        match record.outcome {
            AuditOutcome::Failure => warn!(
                target: "audit",
                event = ?record.event,
                error_code = record.error_code.as_deref().unwrap_or(""),
                reason = record.reason_code.as_deref().unwrap_or(""),
                token = record.token_prefix.as_deref().unwrap_or(""),
                "Token operation rejected"
            ),
            _ => info!(
                target: "audit",
                event = ?record.event,
                outcome = ?record.outcome,
                token = record.token_prefix.as_deref().unwrap_or(""),
                "Token operation"
            ),
        }
        Ok(())
    }
}
