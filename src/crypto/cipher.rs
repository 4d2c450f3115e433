//! Layered authenticated encryption.
//!
//! Each layer is one AES-256-GCM pass with its own derived key and a fresh
//! random nonce stored in front of that layer's ciphertext:
//!
//! ```text
//! layer_i := nonce(12) || seal(key_i, layer_{i-1}) || tag(16)
//! ```
//!
//! Layers are applied `1..=N` outward and peeled `N..=1`. A failing tag on
//! any layer aborts the whole decryption.

use std::sync::atomic::{AtomicU64, Ordering};

use ring::aead::{Aad, Nonce, NONCE_LEN};
use tracing::trace;

use crate::error::{Rejection, TokenError};
use crate::recipe::{Recipe, MAX_LAYERS, MIN_LAYERS};

use super::keys::{KeyDeriver, MasterSecret};
use super::random::RandomSource;

const TAG_LEN: usize = 16;
const AAD_LABEL: &[u8] = b"lumo-token/v1/layer";

/// Bytes each layer adds to its input.
pub const LAYER_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// N-layer AES-256-GCM cipher keyed per recipe version and layer index.
pub struct LayeredCipher {
    keys: KeyDeriver,
    decrypt_attempts: AtomicU64,
}

impl LayeredCipher {
    pub fn new(secret: &MasterSecret) -> Self {
        Self {
            keys: KeyDeriver::new(secret),
            decrypt_attempts: AtomicU64::new(0),
        }
    }

    /// Encrypt `plaintext` with `recipe.layer_count` layers.
    pub fn encrypt(
        &self,
        recipe: &Recipe,
        plaintext: &[u8],
        random: &dyn RandomSource,
    ) -> Result<Vec<u8>, TokenError> {
        if !(MIN_LAYERS..=MAX_LAYERS).contains(&recipe.layer_count) {
            return Err(TokenError::invalid_config(format!(
                "layer_count {} outside [{}, {}]",
                recipe.layer_count, MIN_LAYERS, MAX_LAYERS
            )));
        }

        let mut data = plaintext.to_vec();
        for layer in MIN_LAYERS..=recipe.layer_count {
            let key = self
                .keys
                .layer_key(recipe.version, layer)
                .ok_or_else(|| TokenError::invalid_config("failed to derive layer key"))?;

            let mut nonce = [0u8; NONCE_LEN];
            random.fill(&mut nonce)?;

            key.seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(layer_aad(recipe.version, layer)),
                &mut data,
            )
            .map_err(|_| TokenError::invalid_config("layer encryption failed"))?;

            let mut framed = Vec::with_capacity(NONCE_LEN + data.len());
            framed.extend_from_slice(&nonce);
            framed.append(&mut data);
            data = framed;
        }

        trace!(
            recipe_version = recipe.version,
            layers = recipe.layer_count,
            len = data.len(),
            "Encrypted payload"
        );
        Ok(data)
    }

    /// Peel all layers. No intermediate plaintext is ever returned.
    pub fn decrypt(&self, recipe: &Recipe, ciphertext: &[u8]) -> Result<Vec<u8>, Rejection> {
        self.decrypt_attempts.fetch_add(1, Ordering::Relaxed);

        if !(MIN_LAYERS..=MAX_LAYERS).contains(&recipe.layer_count) {
            return Err(Rejection::auth("layer_count_invalid"));
        }

        let mut data = ciphertext.to_vec();
        for layer in (MIN_LAYERS..=recipe.layer_count).rev() {
            if data.len() < LAYER_OVERHEAD {
                return Err(Rejection::auth("layer_truncated"));
            }

            let key = self
                .keys
                .layer_key(recipe.version, layer)
                .ok_or_else(|| Rejection::auth("layer_key_unavailable"))?;

            let (nonce, body) = data.split_at_mut(NONCE_LEN);
            let nonce = Nonce::try_assume_unique_for_key(nonce)
                .map_err(|_| Rejection::auth("layer_nonce_invalid"))?;

            let plaintext_len = key
                .open_in_place(nonce, Aad::from(layer_aad(recipe.version, layer)), body)
                .map_err(|_| Rejection::auth("layer_tag_mismatch"))?
                .len();

            data = data[NONCE_LEN..NONCE_LEN + plaintext_len].to_vec();
        }

        Ok(data)
    }

    /// Number of decryption attempts so far.
    pub fn decrypt_attempts(&self) -> u64 {
        self.decrypt_attempts.load(Ordering::Relaxed)
    }
}

fn layer_aad(version: u16, layer: u8) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_LABEL.len() + 3);
    aad.extend_from_slice(AAD_LABEL);
    aad.extend_from_slice(&version.to_be_bytes());
    aad.push(layer);
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SystemRandomSource;
    use crate::recipe::Segment;

    fn recipe(version: u16, layer_count: u8) -> Recipe {
        Recipe {
            version,
            segment_pattern: vec![Segment::core(16)],
            charset: "ab".to_string(),
            randomize_noise: false,
            noise_variance: 0,
            layer_count,
            valid_from: 0,
            valid_to: u64::MAX,
        }
    }

    fn cipher() -> LayeredCipher {
        LayeredCipher::new(&MasterSecret::new(vec![11; 32]).unwrap())
    }

    #[test]
    fn test_round_trip_all_layer_counts() {
        let cipher = cipher();
        let rng = SystemRandomSource::new();
        for layers in 1..=3 {
            let recipe = recipe(3, layers);
            let ciphertext = cipher.encrypt(&recipe, b"signed payload", &rng).unwrap();
            assert_eq!(
                ciphertext.len(),
                b"signed payload".len() + LAYER_OVERHEAD * usize::from(layers)
            );
            assert_eq!(cipher.decrypt(&recipe, &ciphertext).unwrap(), b"signed payload");
        }
    }

    #[test]
    fn test_layer_count_out_of_range() {
        let cipher = cipher();
        let rng = SystemRandomSource::new();
        for layers in [0, 4] {
            assert!(matches!(
                cipher.encrypt(&recipe(1, layers), b"x", &rng),
                Err(TokenError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn test_any_flipped_bit_fails() {
        let cipher = cipher();
        let rng = SystemRandomSource::new();
        let recipe = recipe(9, 2);
        let ciphertext = cipher.encrypt(&recipe, b"payload", &rng).unwrap();

        for index in 0..ciphertext.len() {
            let mut tampered = ciphertext.clone();
            tampered[index] ^= 0x01;
            let err = cipher.decrypt(&recipe, &tampered).unwrap_err();
            assert_eq!(err.error, TokenError::AuthenticationFailure);
        }
    }

    #[test]
    fn test_wrong_version_fails() {
        let cipher = cipher();
        let rng = SystemRandomSource::new();
        let ciphertext = cipher.encrypt(&recipe(1, 1), b"payload", &rng).unwrap();
        let err = cipher.decrypt(&recipe(2, 1), &ciphertext).unwrap_err();
        assert_eq!(err.reason, "layer_tag_mismatch");
    }

    #[test]
    fn test_wrong_layer_count_fails() {
        let cipher = cipher();
        let rng = SystemRandomSource::new();
        let ciphertext = cipher.encrypt(&recipe(1, 2), b"payload", &rng).unwrap();
        assert!(cipher.decrypt(&recipe(1, 3), &ciphertext).is_err());
        assert!(cipher.decrypt(&recipe(1, 1), &ciphertext).is_err());
    }

    #[test]
    fn test_truncated_input() {
        let cipher = cipher();
        let err = cipher.decrypt(&recipe(1, 1), &[0u8; 10]).unwrap_err();
        assert_eq!(err.reason, "layer_truncated");
        assert_eq!(cipher.decrypt_attempts(), 1);
    }
}
