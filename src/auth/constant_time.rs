//! The single equality primitive for secret-derived material.
//!
//! Signature tags and checksums are both compared through [`ct_eq`]; no other
//! comparison of such bytes should exist in the crate.

use subtle::ConstantTimeEq;

/// Constant-time byte comparison.
///
/// Runs in time independent of where the inputs differ. Inputs of different
/// lengths compare unequal; length itself is not treated as secret.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal() {
        assert!(ct_eq(b"abcdef", b"abcdef"));
        assert!(ct_eq(b"", b""));
    }

    #[test]
    fn test_unequal() {
        assert!(!ct_eq(b"abcdef", b"abcdeg"));
        assert!(!ct_eq(b"abcdef", b"abcde"));
    }
}
