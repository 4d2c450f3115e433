//! Master secret handling and per-purpose key derivation.

use std::fmt;

use ring::{aead, hkdf, hmac};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::TokenError;

/// Minimum accepted master secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const KDF_SALT: &[u8] = b"lumo-token/v1/kdf-salt";
const LAYER_INFO: &[u8] = b"layer";
const SIGNER_INFO: &[u8] = b"signer";

/// The master secret all keys are derived from.
///
/// Zeroed on drop. `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret(Vec<u8>);

impl MasterSecret {
    pub fn new(bytes: Vec<u8>) -> Result<Self, TokenError> {
        if bytes.len() < MIN_SECRET_LEN {
            return Err(TokenError::invalid_config(format!(
                "master secret must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecret([REDACTED; {}])", self.0.len())
    }
}

/// HKDF-SHA-256 expander seeded by the master secret.
///
/// Keys are recomputed on demand and never stored.
pub struct KeyDeriver {
    prk: hkdf::Prk,
}

impl KeyDeriver {
    pub fn new(secret: &MasterSecret) -> Self {
        let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, KDF_SALT);
        Self {
            prk: salt.extract(secret.expose()),
        }
    }

    /// AES-256-GCM key for one layer of one recipe version.
    pub fn layer_key(&self, version: u16, layer: u8) -> Option<aead::LessSafeKey> {
        let version = version.to_be_bytes();
        let layer = [layer];
        let info = [LAYER_INFO, &version[..], &layer[..]];
        let okm = self.prk.expand(&info, &aead::AES_256_GCM).ok()?;
        Some(aead::LessSafeKey::new(aead::UnboundKey::from(okm)))
    }

    /// HMAC-SHA-256 key used by the signer.
    pub fn signing_key(&self) -> Result<hmac::Key, TokenError> {
        let info = [SIGNER_INFO];
        let okm = self
            .prk
            .expand(&info, hmac::HMAC_SHA256)
            .map_err(|_| TokenError::invalid_config("failed to derive signing key"))?;
        Ok(hmac::Key::from(okm))
    }
}
