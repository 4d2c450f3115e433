//! Secure random source seam.

use ring::rand::{SecureRandom, SystemRandom};

use crate::error::TokenError;

/// Source of cryptographically secure bytes (nonces, randomized noise).
pub trait RandomSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<(), TokenError>;
}

/// Operating system randomness via `ring`.
pub struct SystemRandomSource {
    rng: SystemRandom,
}

impl SystemRandomSource {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SystemRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandomSource {
    fn fill(&self, dest: &mut [u8]) -> Result<(), TokenError> {
        self.rng
            .fill(dest)
            .map_err(|_| TokenError::EntropyUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_produces_distinct_output() {
        let source = SystemRandomSource::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        source.fill(&mut a).unwrap();
        source.fill(&mut b).unwrap();
        assert_ne!(a, b);
    }
}
