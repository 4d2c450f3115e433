//! Batch request types.

use std::time::Duration;

use crate::claims::{Context, Fields};
use crate::recipe::Recipe;

/// One item of [`TokenPipeline::generate_batch`](super::TokenPipeline::generate_batch).
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub user_id: String,
    pub fields: Fields,
    pub context: Option<Context>,
    /// `None` uses the configured default TTL.
    pub ttl: Option<Duration>,
    pub recipe: Option<Recipe>,
}

impl GenerateRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// One item of [`TokenPipeline::verify_batch`](super::TokenPipeline::verify_batch).
#[derive(Debug, Clone, Default)]
pub struct VerifyRequest {
    pub token: String,
    pub user_id: Option<String>,
    pub context: Option<Context>,
    pub recipe: Option<Recipe>,
}

impl VerifyRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }
}
