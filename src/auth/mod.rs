//! Authentication and issuance policy.
//!
//! Handles HMAC signing, the shared constant-time comparison, per-key rate
//! limiting and the revocation store seam.

mod constant_time;
mod rate_limit;
mod revocation;
mod signer;

pub use constant_time::ct_eq;
pub use rate_limit::{RateDecision, RateLimiter};
pub use revocation::{InMemoryRevocationStore, RevocationStore};
pub use signer::{Signer, SIGNATURE_LEN};
