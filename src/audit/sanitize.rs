//! Token redaction for audit records and logs.

/// Characters of a token kept in audit output.
const VISIBLE_PREFIX: usize = 8;

/// Reduce a token to a short, non-replayable prefix.
///
/// Tokens too short to redact meaningfully are hidden entirely.
pub fn redact_token(token: &str) -> String {
    match token.char_indices().nth(VISIBLE_PREFIX) {
        Some((cut, _)) => format!("{}...", &token[..cut]),
        None => "[REDACTED]".to_string(),
    }
}
