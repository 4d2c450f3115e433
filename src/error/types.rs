//! Error types for the token pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Public error taxonomy for generate, verify, refresh and revoke.
///
/// Verification failures are deliberately coarse: the returned value never
/// says which layer, key or field caused an authentication failure. The
/// fine-grained cause travels only through the audit sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Checksum mismatch or structurally invalid token text.
    #[error("Malformed token")]
    MalformedToken,

    /// The embedded recipe version is not resolvable.
    #[error("Unknown recipe version")]
    UnknownRecipeVersion,

    /// A cipher layer tag or the signature failed to verify.
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// The bound user or context differs from the one supplied.
    #[error("Context mismatch")]
    ContextMismatch,

    #[error("Token expired")]
    Expired,

    #[error("Token revoked")]
    Revoked,

    /// Issuance throttled for this key.
    #[error("Rate limit exceeded for '{key}': {limit} tokens per window, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        key: String,
        limit: usize,
        retry_after_secs: u64,
    },

    /// Generation-time configuration or argument error.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The secure random source failed.
    #[error("Secure random source unavailable")]
    EntropyUnavailable,
}

impl TokenError {
    /// Build an [`TokenError::InvalidConfig`] from any message.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Stable machine-readable code, used in audit records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::UnknownRecipeVersion => "UNKNOWN_RECIPE_VERSION",
            Self::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            Self::ContextMismatch => "CONTEXT_MISMATCH",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::EntropyUnavailable => "ENTROPY_UNAVAILABLE",
        }
    }
}

/// A verification rejection with its internal cause.
///
/// `reason` is a short snake_case code such as `layer_tag_mismatch`. It is
/// reported to the audit sink and debug logs only; callers receive `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub error: TokenError,
    pub reason: &'static str,
}

impl Rejection {
    pub fn new(error: TokenError, reason: &'static str) -> Self {
        Self { error, reason }
    }

    pub fn malformed(reason: &'static str) -> Self {
        Self::new(TokenError::MalformedToken, reason)
    }

    pub fn auth(reason: &'static str) -> Self {
        Self::new(TokenError::AuthenticationFailure, reason)
    }

    pub fn context(reason: &'static str) -> Self {
        Self::new(TokenError::ContextMismatch, reason)
    }
}

impl From<Rejection> for TokenError {
    fn from(rejection: Rejection) -> Self {
        rejection.error
    }
}

/// Errors raised while loading settings or the master secret.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Secret error: {message}")]
    Secret { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Result type alias for token operations.
pub type TokenResult<T> = Result<T, TokenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_errors_are_generic() {
        assert_eq!(TokenError::AuthenticationFailure.to_string(), "Authentication failed");
        assert_eq!(TokenError::MalformedToken.to_string(), "Malformed token");
    }

    #[test]
    fn test_actionable_errors_carry_detail() {
        let err = TokenError::RateLimitExceeded {
            key: "u1".to_string(),
            limit: 5,
            retry_after_secs: 12,
        };
        let message = err.to_string();
        assert!(message.contains("u1"));
        assert!(message.contains("12s"));

        let err = TokenError::invalid_config("ttl must be positive");
        assert!(err.to_string().contains("ttl must be positive"));
    }

    #[test]
    fn test_rejection_hides_reason() {
        let rejection = Rejection::auth("layer_tag_mismatch");
        let err: TokenError = rejection.into();
        assert_eq!(err, TokenError::AuthenticationFailure);
        assert_eq!(err.code(), "AUTHENTICATION_FAILURE");
    }
}
