//! UUID-shaped visual encoding with a trailing checksum.
//!
//! ```text
//! token := group(hex(version(2) || body)) "." hex(sha256(grouped)[..4])
//! ```
//!
//! Hex digits are grouped cyclically as 8-4-4-4-12; the last group may be
//! short. The checksum is verified before anything else is decoded so that
//! random or mangled strings are rejected without any cryptographic work.

use ring::digest;

use crate::auth::ct_eq;
use crate::error::Rejection;

/// Hex characters in the checksum suffix.
pub const CHECKSUM_LEN: usize = 8;

/// Longest token text accepted for verification.
pub const MAX_TOKEN_LEN: usize = 16 * 1024;

const GROUP_SIZES: [usize; 5] = [8, 4, 4, 4, 12];
const GROUP_SEPARATOR: char = '-';
const CHECKSUM_SEPARATOR: char = '.';

/// Encode a version tag and obfuscated body into token text.
pub fn encode(version: u16, body: &[u8]) -> String {
    let mut raw = Vec::with_capacity(2 + body.len());
    raw.extend_from_slice(&version.to_be_bytes());
    raw.extend_from_slice(body);

    let hex = hex::encode(raw);
    let mut grouped = String::with_capacity(hex.len() + hex.len() / 4 + CHECKSUM_LEN + 1);
    let mut offset = 0;
    for size in GROUP_SIZES.iter().cycle() {
        if offset >= hex.len() {
            break;
        }
        if offset > 0 {
            grouped.push(GROUP_SEPARATOR);
        }
        let end = (offset + size).min(hex.len());
        grouped.push_str(&hex[offset..end]);
        offset = end;
    }

    let sum = checksum(&grouped);
    grouped.push(CHECKSUM_SEPARATOR);
    grouped.push_str(&sum);
    grouped
}

/// Checksum over the grouped body text.
pub fn checksum(grouped: &str) -> String {
    let hash = digest::digest(&digest::SHA256, grouped.as_bytes());
    hex::encode(&hash.as_ref()[..CHECKSUM_LEN / 2])
}

/// Verify the checksum suffix and return the grouped body.
pub fn verify_checksum(token: &str) -> Result<&str, Rejection> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(Rejection::malformed("token_too_long"));
    }

    let (grouped, sum) = token
        .rsplit_once(CHECKSUM_SEPARATOR)
        .ok_or_else(|| Rejection::malformed("checksum_missing"))?;

    if sum.len() != CHECKSUM_LEN {
        return Err(Rejection::malformed("checksum_length"));
    }

    let expected = checksum(grouped);
    if !ct_eq(expected.as_bytes(), sum.as_bytes()) {
        return Err(Rejection::malformed("checksum_mismatch"));
    }

    Ok(grouped)
}

/// Decode a checksum-verified body into its version tag and bytes.
pub fn decode(grouped: &str) -> Result<(u16, Vec<u8>), Rejection> {
    let groups: Vec<&str> = grouped.split(GROUP_SEPARATOR).collect();
    let last = groups.len() - 1;

    let mut hex = String::with_capacity(grouped.len());
    for (index, group) in groups.iter().enumerate() {
        let expected = GROUP_SIZES[index % GROUP_SIZES.len()];
        let fits = if index == last {
            !group.is_empty() && group.len() <= expected
        } else {
            group.len() == expected
        };
        if !fits {
            return Err(Rejection::malformed("group_layout"));
        }
        hex.push_str(group);
    }

    // Only the lowercase form is canonical; anything else is a re-encoding.
    if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(Rejection::malformed("not_hex"));
    }
    let raw = hex::decode(&hex).map_err(|_| Rejection::malformed("not_hex"))?;
    if raw.len() < 3 {
        return Err(Rejection::malformed("body_too_short"));
    }

    let version = u16::from_be_bytes([raw[0], raw[1]]);
    Ok((version, raw[2..].to_vec()))
}
