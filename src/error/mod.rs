//! Error types for token issuance and verification.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
