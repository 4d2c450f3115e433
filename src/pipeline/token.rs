//! Token wire string and identifiers.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::claims::{Claims, Context};
use crate::crypto::RandomSource;
use crate::error::TokenError;

/// Random bytes behind a [`TokenId`].
const TOKEN_ID_BYTES: usize = 16;

/// An issued token. Opaque text, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    wire: String,
    id: TokenId,
}

impl Token {
    pub(crate) fn new(wire: String, id: TokenId) -> Self {
        Self { wire, id }
    }

    pub fn as_str(&self) -> &str {
        &self.wire
    }

    pub fn into_string(self) -> String {
        self.wire
    }

    /// Identifier used for revocation and refresh lineage. This is the
    /// signed `jti` claim, so it does not change when the text is re-encoded.
    pub fn id(&self) -> TokenId {
        self.id.clone()
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.wire
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire)
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.wire)
    }
}

/// Random identifier assigned at issuance and carried inside the signed claims.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn generate(random: &dyn RandomSource) -> Result<Self, TokenError> {
        let mut raw = [0u8; TOKEN_ID_BYTES];
        random.fill(&mut raw)?;
        Ok(Self(hex::encode(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Successful verification result.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    pub claims: Claims,
    /// Context the token was bound to at issuance.
    pub context: Context,
    pub token_id: TokenId,
    pub recipe_version: u16,
}

/// Structural facts about a token, obtained without any key material.
///
/// Carries no identifier: nothing here is authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub recipe_version: u16,
    /// Length of the obfuscated body in bytes.
    pub body_len: usize,
}
