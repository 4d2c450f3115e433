//! Generation and verification state machines.
//!
//! Stages only move forward. A failure at any point ends the run in a
//! rejection carrying the last stage reached.

use std::fmt;

/// Generation stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GenerateStage {
    Building,
    Signed,
    Encrypted,
    Obfuscated,
    Camouflaged,
}

impl GenerateStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Signed => "signed",
            Self::Encrypted => "encrypted",
            Self::Obfuscated => "obfuscated",
            Self::Camouflaged => "camouflaged",
        }
    }
}

impl fmt::Display for GenerateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerifyStage {
    Received,
    ChecksumOk,
    Decamouflaged,
    Deobfuscated,
    Decrypted,
    SignatureOk,
    ContextOk,
    Valid,
}

impl VerifyStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ChecksumOk => "checksum_ok",
            Self::Decamouflaged => "decamouflaged",
            Self::Deobfuscated => "deobfuscated",
            Self::Decrypted => "decrypted",
            Self::SignatureOk => "signature_ok",
            Self::ContextOk => "context_ok",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for VerifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(VerifyStage::Received < VerifyStage::ChecksumOk);
        assert!(VerifyStage::SignatureOk < VerifyStage::ContextOk);
        assert!(VerifyStage::ContextOk < VerifyStage::Valid);
        assert!(GenerateStage::Building < GenerateStage::Camouflaged);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(VerifyStage::ChecksumOk.to_string(), "checksum_ok");
        assert_eq!(GenerateStage::Obfuscated.to_string(), "obfuscated");
    }
}
