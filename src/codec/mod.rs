//! Byte-level token encodings: noise interleaving and the UUID-like
//! camouflage with its checksum gate.

pub mod camouflage;
pub mod obfuscate;

pub use camouflage::{checksum, decode, encode, verify_checksum, CHECKSUM_LEN, MAX_TOKEN_LEN};
pub use obfuscate::{deobfuscate, obfuscate};
