//! Lumo Token Library
//!
//! Issues and verifies self-contained security tokens that bind user claims
//! to an execution context. A token is signed, wrapped in one to three
//! AEAD layers, interleaved with noise according to a rotating recipe and
//! finally rendered as a UUID-like string with a checksum.
//!
//! The entry point is [`TokenPipeline`].

pub mod audit;
pub mod auth;
pub mod claims;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod pipeline;
pub mod recipe;

pub use claims::{Claims, Context, Fields};
pub use crypto::MasterSecret;
pub use error::{TokenError, TokenResult};
pub use pipeline::{Token, TokenId, TokenPipeline, VerifiedToken};
pub use recipe::Recipe;
