//! Cryptographic building blocks.
//!
//! Key derivation, the secure random seam and the layered AEAD cipher.
//! Everything here is backed by `ring`.

mod cipher;
mod keys;
mod random;

pub use cipher::{LayeredCipher, LAYER_OVERHEAD};
pub use keys::{KeyDeriver, MasterSecret, MIN_SECRET_LEN};
pub use random::{RandomSource, SystemRandomSource};
