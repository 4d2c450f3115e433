//! Noise injection and removal driven by a recipe's segment pattern.
//!
//! The pattern is walked cyclically. A core segment carries up to its length
//! of data bytes; a noise segment emits filler. Emission stops right after
//! the last data byte, so the stream never ends inside noise. Noise lengths
//! depend only on `(recipe, segment position)`, which makes every boundary
//! recoverable from the recipe and the stream length alone.

use ring::digest;

use crate::crypto::RandomSource;
use crate::error::{Rejection, TokenError};
use crate::recipe::{Recipe, Segment, SegmentKind};

const NOISE_LEN_LABEL: &[u8] = b"lumo-token/v1/noise-len";
const NOISE_BYTES_LABEL: &[u8] = b"lumo-token/v1/noise";

/// Interleave `data` with noise according to `recipe`.
pub fn obfuscate(
    recipe: &Recipe,
    data: &[u8],
    random: &dyn RandomSource,
) -> Result<Vec<u8>, TokenError> {
    if data.is_empty() {
        return Err(TokenError::invalid_config("nothing to obfuscate"));
    }
    if !has_core(recipe) {
        return Err(TokenError::invalid_config(
            "segment_pattern needs at least one core segment",
        ));
    }

    let mut out = Vec::with_capacity(data.len() * 2);
    let mut rest = data;

    for (position, segment) in positions(recipe) {
        if rest.is_empty() {
            break;
        }
        match segment.kind {
            SegmentKind::Noise => {
                let len = noise_length(recipe, segment, position);
                push_noise(recipe, position, len, random, &mut out)?;
            }
            SegmentKind::Core => {
                let take = usize::from(segment.length).min(rest.len());
                out.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
            }
        }
    }

    Ok(out)
}

/// Walk the same pattern and keep only the core bytes.
pub fn deobfuscate(recipe: &Recipe, stream: &[u8]) -> Result<Vec<u8>, Rejection> {
    if stream.is_empty() {
        return Err(Rejection::malformed("stream_empty"));
    }
    if !has_core(recipe) {
        return Err(Rejection::malformed("recipe_without_core"));
    }

    let charset = recipe.charset_bytes();
    let mut out = Vec::with_capacity(stream.len());
    let mut rest = stream;

    for (position, segment) in positions(recipe) {
        if rest.is_empty() {
            break;
        }
        match segment.kind {
            SegmentKind::Noise => {
                let len = noise_length(recipe, segment, position);
                // Data always follows noise.
                if rest.len() <= len {
                    return Err(Rejection::malformed("stream_ends_in_noise"));
                }
                let (noise, tail) = rest.split_at(len);
                if noise.iter().any(|b| !charset.contains(b)) {
                    return Err(Rejection::malformed("noise_outside_charset"));
                }
                if !recipe.randomize_noise && noise != derived_noise(recipe, position, len) {
                    return Err(Rejection::malformed("noise_mismatch"));
                }
                rest = tail;
            }
            SegmentKind::Core => {
                let take = usize::from(segment.length).min(rest.len());
                out.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
            }
        }
    }

    Ok(out)
}

fn has_core(recipe: &Recipe) -> bool {
    recipe
        .segment_pattern
        .iter()
        .any(|s| s.kind == SegmentKind::Core && s.length > 0)
}

/// Infinite `(absolute position, segment)` walk over the pattern.
fn positions(recipe: &Recipe) -> impl Iterator<Item = (u32, &Segment)> {
    (0u32..).zip(recipe.segment_pattern.iter().cycle())
}

fn noise_length(recipe: &Recipe, segment: &Segment, position: u32) -> usize {
    let base = usize::from(segment.length);
    if recipe.noise_variance == 0 {
        return base;
    }

    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(NOISE_LEN_LABEL);
    ctx.update(&recipe.version.to_be_bytes());
    ctx.update(&position.to_be_bytes());
    let hash = ctx.finish();
    let bytes = hash.as_ref();
    let spread = u16::from(recipe.noise_variance) + 1;
    base + usize::from(u16::from_be_bytes([bytes[0], bytes[1]]) % spread)
}

fn push_noise(
    recipe: &Recipe,
    position: u32,
    len: usize,
    random: &dyn RandomSource,
    out: &mut Vec<u8>,
) -> Result<(), TokenError> {
    if !recipe.randomize_noise {
        out.extend(derived_noise(recipe, position, len));
        return Ok(());
    }

    let mut raw = vec![0u8; len];
    random.fill(&mut raw)?;
    out.extend(to_charset(recipe, &raw));
    Ok(())
}

/// Reproducible noise for recipes without `randomize_noise`.
fn derived_noise(recipe: &Recipe, position: u32, len: usize) -> Vec<u8> {
    let mut raw = vec![0u8; len];
    let mut counter: u32 = 0;
    for chunk in raw.chunks_mut(digest::SHA256_OUTPUT_LEN) {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(NOISE_BYTES_LABEL);
        ctx.update(&recipe.version.to_be_bytes());
        ctx.update(&position.to_be_bytes());
        ctx.update(&counter.to_be_bytes());
        let hash = ctx.finish();
        chunk.copy_from_slice(&hash.as_ref()[..chunk.len()]);
        counter += 1;
    }
    to_charset(recipe, &raw)
}

fn to_charset(recipe: &Recipe, raw: &[u8]) -> Vec<u8> {
    let charset = recipe.charset_bytes();
    raw.iter()
        .map(|b| charset[usize::from(*b) % charset.len()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SystemRandomSource;

    fn recipe(randomize_noise: bool, noise_variance: u8) -> Recipe {
        Recipe {
            version: 0x0102,
            segment_pattern: vec![
                Segment::noise(3),
                Segment::core(5),
                Segment::noise(2),
                Segment::core(4),
            ],
            charset: "xyz".to_string(),
            randomize_noise,
            noise_variance,
            layer_count: 1,
            valid_from: 0,
            valid_to: u64::MAX,
        }
    }

    #[test]
    fn test_layout_without_variance() {
        let data: Vec<u8> = (0..12).collect();
        let stream = obfuscate(&recipe(false, 0), &data, &SystemRandomSource::new()).unwrap();

        // noise(3) core(5) noise(2) core(4) noise(3) core(3 of 5)
        assert_eq!(stream.len(), 3 + 5 + 2 + 4 + 3 + 3);
        assert_eq!(&stream[3..8], &data[0..5]);
        assert_eq!(&stream[10..14], &data[5..9]);
        assert_eq!(&stream[17..], &data[9..]);
        assert!(stream[..3].iter().all(|b| b"xyz".contains(b)));
    }

    #[test]
    fn test_round_trip_with_variance() {
        let data: Vec<u8> = (0..=255).collect();
        for randomize in [false, true] {
            let recipe = recipe(randomize, 5);
            let stream = obfuscate(&recipe, &data, &SystemRandomSource::new()).unwrap();
            assert_eq!(deobfuscate(&recipe, &stream).unwrap(), data);
        }
    }

    #[test]
    fn test_deterministic_noise_is_reproducible() {
        let recipe = recipe(false, 3);
        let rng = SystemRandomSource::new();
        let a = obfuscate(&recipe, b"some ciphertext bytes", &rng).unwrap();
        let b = obfuscate(&recipe, b"some ciphertext bytes", &rng).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stream_ending_in_noise_rejected() {
        let recipe = recipe(false, 0);
        let stream = obfuscate(&recipe, &[7u8; 5], &SystemRandomSource::new()).unwrap();
        let mut padded = stream.clone();
        padded.extend_from_slice(b"xy");
        assert_eq!(
            deobfuscate(&recipe, &padded).unwrap_err().reason,
            "stream_ends_in_noise"
        );
    }

    #[test]
    fn test_noise_outside_charset_rejected() {
        let recipe = recipe(false, 0);
        let mut stream = obfuscate(&recipe, &[7u8; 9], &SystemRandomSource::new()).unwrap();
        stream[0] = b'!';
        assert_eq!(
            deobfuscate(&recipe, &stream).unwrap_err().reason,
            "noise_outside_charset"
        );
    }

    #[test]
    fn test_altered_derived_noise_rejected() {
        let recipe = recipe(false, 0);
        let mut stream = obfuscate(&recipe, &[7u8; 9], &SystemRandomSource::new()).unwrap();
        // Swap the first noise byte for another charset character
        stream[0] = if stream[0] == b'x' { b'y' } else { b'x' };
        assert_eq!(
            deobfuscate(&recipe, &stream).unwrap_err().reason,
            "noise_mismatch"
        );
    }

    #[test]
    fn test_empty_input() {
        let recipe = recipe(false, 0);
        assert!(obfuscate(&recipe, &[], &SystemRandomSource::new()).is_err());
        assert!(deobfuscate(&recipe, &[]).is_err());
    }
}
