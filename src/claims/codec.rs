//! Canonical serialization and the signed frame layout.
//!
//! ```text
//! frame := u32be(len(claims)) || claims || u32be(len(context)) || context || tag(32)
//! ```
//!
//! Claims and context are JSON with struct fields in declaration order and
//! map keys sorted, so equal values always produce equal bytes regardless of
//! how the caller built them.

use crate::auth::{Signer, SIGNATURE_LEN};
use crate::error::{Rejection, TokenError};

use super::types::{Claims, Context};

const LEN_PREFIX: usize = 4;

/// Borrowed view of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub claims: &'a [u8],
    pub context: &'a [u8],
    pub signature: &'a [u8],
}

impl Frame<'_> {
    /// Check the tag with `signer`.
    pub fn verify(&self, signer: &Signer) -> Result<(), Rejection> {
        if signer.verify(self.claims, self.context, self.signature) {
            Ok(())
        } else {
            Err(Rejection::auth("signature_mismatch"))
        }
    }
}

/// Canonically encode and sign claims and context into one frame.
pub fn encode_frame(
    claims: &Claims,
    context: &Context,
    signer: &Signer,
) -> Result<Vec<u8>, TokenError> {
    let claims_bytes = serde_json::to_vec(claims)
        .map_err(|e| TokenError::invalid_config(format!("claims not serializable: {}", e)))?;
    let context_bytes = serde_json::to_vec(context)
        .map_err(|e| TokenError::invalid_config(format!("context not serializable: {}", e)))?;

    let claims_len = u32::try_from(claims_bytes.len())
        .map_err(|_| TokenError::invalid_config("claims too large"))?;
    let context_len = u32::try_from(context_bytes.len())
        .map_err(|_| TokenError::invalid_config("context too large"))?;

    let mut frame = Vec::with_capacity(
        2 * LEN_PREFIX + claims_bytes.len() + context_bytes.len() + SIGNATURE_LEN,
    );
    frame.extend_from_slice(&claims_len.to_be_bytes());
    frame.extend_from_slice(&claims_bytes);
    frame.extend_from_slice(&context_len.to_be_bytes());
    frame.extend_from_slice(&context_bytes);

    let (claims_region, context_region) = frame.split_at(LEN_PREFIX + claims_bytes.len());
    let tag = signer.sign(claims_region, context_region);
    frame.extend_from_slice(&tag);
    Ok(frame)
}

/// Split a frame into its parts without interpreting them.
///
/// The signed regions include their length prefixes so that moving bytes
/// between claims and context invalidates the tag.
pub fn split_frame(frame: &[u8]) -> Result<Frame<'_>, Rejection> {
    if frame.len() < 2 * LEN_PREFIX + SIGNATURE_LEN {
        return Err(Rejection::auth("frame_truncated"));
    }

    let (body, signature) = frame.split_at(frame.len() - SIGNATURE_LEN);

    let claims_len = read_len(body, 0)?;
    let claims_end = LEN_PREFIX
        .checked_add(claims_len)
        .filter(|&end| end + LEN_PREFIX <= body.len())
        .ok_or_else(|| Rejection::auth("frame_claims_overflow"))?;

    let context_len = read_len(body, claims_end)?;
    if claims_end + LEN_PREFIX + context_len != body.len() {
        return Err(Rejection::auth("frame_context_length"));
    }

    Ok(Frame {
        claims: &body[..claims_end],
        context: &body[claims_end..],
        signature,
    })
}

/// Decode the claims region of a verified frame.
pub fn decode_claims(frame: &Frame<'_>) -> Result<Claims, Rejection> {
    serde_json::from_slice(&frame.claims[LEN_PREFIX..])
        .map_err(|_| Rejection::auth("claims_undecodable"))
}

/// Decode the context region of a verified frame.
pub fn decode_context(frame: &Frame<'_>) -> Result<Context, Rejection> {
    serde_json::from_slice(&frame.context[LEN_PREFIX..])
        .map_err(|_| Rejection::auth("context_undecodable"))
}

fn read_len(bytes: &[u8], offset: usize) -> Result<usize, Rejection> {
    let raw = bytes
        .get(offset..offset + LEN_PREFIX)
        .ok_or_else(|| Rejection::auth("frame_truncated"))?;
    let mut buf = [0u8; LEN_PREFIX];
    buf.copy_from_slice(raw);
    Ok(u32::from_be_bytes(buf) as usize)
}
