//! Claims, context and their canonical byte encoding.

mod codec;
mod types;

pub use codec::{decode_claims, decode_context, encode_frame, split_frame, Frame};
pub use types::{Claims, Context, Fields};
