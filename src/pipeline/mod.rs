//! The token pipeline.
//!
//! Generation runs `BUILDING -> SIGNED -> ENCRYPTED -> OBFUSCATED ->
//! CAMOUFLAGED`. Verification runs `RECEIVED -> CHECKSUM_OK ->
//! DECAMOUFLAGED -> DEOBFUSCATED -> DECRYPTED -> SIGNATURE_OK -> CONTEXT_OK
//! -> VALID`, and any step may end in a rejection.

mod batch;
mod clock;
mod engine;
mod policy;
mod stage;
mod token;

pub use batch::{GenerateRequest, VerifyRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::TokenPipeline;
pub use policy::ContextPolicy;
pub use stage::{GenerateStage, VerifyStage};
pub use token::{Token, TokenId, TokenInfo, VerifiedToken};
