//! HMAC-SHA256 signing of the claims/context frame.

use ring::hmac;

use crate::crypto::{KeyDeriver, MasterSecret};
use crate::error::TokenError;

use super::constant_time::ct_eq;

/// Length of the appended tag.
pub const SIGNATURE_LEN: usize = 32;

/// Signs and verifies canonical claim frames.
///
/// One tag covers the claims and the context fingerprint together, so
/// authenticity and context binding are checked by a single authenticator.
pub struct Signer {
    key: hmac::Key,
}

impl Signer {
    /// Create a signer keyed from the master secret.
    pub fn new(secret: &MasterSecret) -> Result<Self, TokenError> {
        Ok(Self {
            key: KeyDeriver::new(secret).signing_key()?,
        })
    }

    /// Compute the tag over `claims || context`.
    pub fn sign(&self, claims: &[u8], context: &[u8]) -> [u8; SIGNATURE_LEN] {
        let mut ctx = hmac::Context::with_key(&self.key);
        ctx.update(claims);
        ctx.update(context);
        let tag = ctx.sign();

        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(tag.as_ref());
        out
    }

    /// Verify `signature` in constant time.
    pub fn verify(&self, claims: &[u8], context: &[u8], signature: &[u8]) -> bool {
        let expected = self.sign(claims, context);
        ct_eq(&expected, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_signer() -> Signer {
        let secret = MasterSecret::new(b"test-secret-key-32-bytes-long!!!".to_vec()).unwrap();
        Signer::new(&secret).unwrap()
    }

    #[test]
    fn test_valid_signature() {
        let signer = create_test_signer();
        let tag = signer.sign(b"claims", b"context");
        assert!(signer.verify(b"claims", b"context", &tag));
    }

    #[test]
    fn test_invalid_signature() {
        let signer = create_test_signer();
        let mut tag = signer.sign(b"claims", b"context");
        tag[0] ^= 0x80;
        assert!(!signer.verify(b"claims", b"context", &tag));
        assert!(!signer.verify(b"claims", b"context", b"short"));
    }

    #[test]
    fn test_context_is_bound() {
        let signer = create_test_signer();
        let tag = signer.sign(b"claims", b"device-a");
        assert!(!signer.verify(b"claims", b"device-b", &tag));
    }

    #[test]
    fn test_different_secret_rejected() {
        let signer = create_test_signer();
        let other =
            Signer::new(&MasterSecret::new(b"another-secret-key-32-bytes-long".to_vec()).unwrap())
                .unwrap();
        let tag = signer.sign(b"claims", b"context");
        assert!(!other.verify(b"claims", b"context", &tag));
    }
}
