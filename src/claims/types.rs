//! Claims and context data model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::TokenId;

/// Application-defined claim fields, kept sorted by key.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Claims bound into a token. Never mutated after signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    /// Random token identifier, used for revocation and refresh lineage.
    pub jti: TokenId,
    pub user_id: String,
    /// Unix seconds.
    pub issued_at: u64,
    /// Unix seconds.
    pub expires_at: u64,
    #[serde(default)]
    pub fields: Fields,
    /// Token this one was refreshed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TokenId>,
    #[serde(default)]
    pub refresh_count: u32,
}

impl Claims {
    /// Seconds of validity left at `now`.
    pub fn remaining(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Original lifetime in seconds.
    pub fn lifetime(&self) -> u64 {
        self.expires_at.saturating_sub(self.issued_at)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Caller-supplied execution context.
///
/// All attributes are opaque strings; an empty string means "not bound".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Context {
    #[serde(default)]
    pub device_fingerprint: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub client_type: String,
    #[serde(default)]
    pub behavior_pattern: String,
}

impl Context {
    pub fn new(
        device_fingerprint: impl Into<String>,
        location: impl Into<String>,
        client_type: impl Into<String>,
    ) -> Self {
        Self {
            device_fingerprint: device_fingerprint.into(),
            location: location.into(),
            client_type: client_type.into(),
            behavior_pattern: String::new(),
        }
    }

    pub fn with_behavior_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.behavior_pattern = pattern.into();
        self
    }
}
