//! Deterministic recipe derivation.
//!
//! `derive_recipe` is a pure function of the master secret, the recipe
//! version and the configured layer count. Any verifier holding the same
//! secret reproduces the same recipe without coordination.
//!
//! Versions wrap every 65 536 buckets, so a derived recipe carries an open
//! validity window. When a derived version is accepted is decided by
//! [`RecipeManager`](super::RecipeManager) from the active rotation bucket.

use ring::hmac;

use crate::crypto::MasterSecret;

use super::types::{Recipe, Segment};

const RECIPE_LABEL: &[u8] = b"lumo-token/v1/recipe";

/// Noise alphabets a derived recipe may select from.
pub const CHARSETS: [&str; 3] = [
    "0123456789abcdef",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_",
];

/// Map a rotation bucket to its 2-byte recipe version.
pub fn version_for_bucket(bucket: u64) -> u16 {
    (bucket & 0xFFFF) as u16
}

/// Derive the recipe for `version`.
pub fn derive_recipe(secret: &MasterSecret, version: u16, layer_count: u8) -> Recipe {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.expose());
    let mut ctx = hmac::Context::with_key(&key);
    ctx.update(RECIPE_LABEL);
    ctx.update(&version.to_be_bytes());
    let tag = ctx.sign();
    let seed = tag.as_ref();

    let pairs = 2 + usize::from(seed[0] % 3);
    let noise_variance = seed[1] % 4;
    let randomize_noise = seed[2] & 1 == 1;
    let charset = CHARSETS[usize::from(seed[3]) % CHARSETS.len()];

    let segment_pattern = (0..pairs)
        .flat_map(|i| {
            let noise = 2 + u16::from(seed[4 + 2 * i] % 6);
            let core = 8 + u16::from(seed[5 + 2 * i] % 17);
            [Segment::noise(noise), Segment::core(core)]
        })
        .collect();

    Recipe {
        version,
        segment_pattern,
        charset: charset.to_string(),
        randomize_noise,
        noise_variance,
        layer_count,
        valid_from: 0,
        valid_to: u64::MAX,
    }
}
