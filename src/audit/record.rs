//! Audit record types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::TokenError;

use super::sanitize::redact_token;

/// Operation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Generate,
    Verify,
    Refresh,
    Revoke,
}

/// How the operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    /// Completed without effect, e.g. a refresh outside the refresh window.
    NoOp,
}

/// A single audit record.
///
/// Unlike the error returned to callers, `reason_code` carries the precise
/// internal cause of a rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub record_id: Uuid,
    /// RFC 3339 time taken from the pipeline clock.
    pub timestamp: String,
    pub event: AuditEvent,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_version: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

impl AuditRecord {
    /// Create a record for the given event and outcome at `now` (unix seconds).
    pub fn new(event: AuditEvent, outcome: AuditOutcome, now: u64) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: format_timestamp(now),
            event,
            outcome,
            token_prefix: None,
            subject: None,
            recipe_version: None,
            error_code: None,
            reason_code: None,
        }
    }

    /// Create a failure record from a returned error and its internal reason.
    pub fn failure(event: AuditEvent, now: u64, error: &TokenError, reason: &str) -> Self {
        let mut record = Self::new(event, AuditOutcome::Failure, now);
        record.error_code = Some(error.code().to_string());
        record.reason_code = Some(reason.to_string());
        record
    }

    /// Attach a redacted prefix of `token`.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token_prefix = Some(redact_token(token));
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_recipe_version(mut self, version: u16) -> Self {
        self.recipe_version = Some(version);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason_code = Some(reason.into());
        self
    }
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_serialization() {
        let record = AuditRecord::new(AuditEvent::Generate, AuditOutcome::Success, 1_705_314_645)
            .with_token("0a1b2c3d-4e5f-6071-8293.deadbeef")
            .with_subject("u1")
            .with_recipe_version(7);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"event\":\"generate\""));
        assert!(json.contains("\"outcome\":\"success\""));
        assert!(json.contains("\"timestamp\":\"2024-01-15T10:30:45Z\""));
        assert!(json.contains("\"recipe_version\":7"));
        assert!(!json.contains("reason_code"));
        assert!(!json.contains("deadbeef"));
    }

    #[test]
    fn test_failure_serialization() {
        let record = AuditRecord::failure(
            AuditEvent::Verify,
            0,
            &TokenError::AuthenticationFailure,
            "layer_tag_mismatch",
        );

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"outcome\":\"failure\""));
        assert!(json.contains("\"error_code\":\"AUTHENTICATION_FAILURE\""));
        assert!(json.contains("\"reason_code\":\"layer_tag_mismatch\""));
        assert!(json.contains("1970-01-01T00:00:00Z"));
    }
}
