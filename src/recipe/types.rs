//! Recipe data model and validation.

use serde::{Deserialize, Serialize};

use crate::error::TokenError;

pub const MIN_LAYERS: u8 = 1;
pub const MAX_LAYERS: u8 = 3;

/// Longest pattern accepted from a caller.
const MAX_SEGMENTS: usize = 32;

/// Upper bound on the noise length jitter.
const MAX_NOISE_VARIANCE: u8 = 64;

/// Whether a segment carries token data or filler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Core,
    Noise,
}

/// One entry of a segment pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub length: u16,
    pub kind: SegmentKind,
}

impl Segment {
    pub const fn core(length: u16) -> Self {
        Self {
            length,
            kind: SegmentKind::Core,
        }
    }

    pub const fn noise(length: u16) -> Self {
        Self {
            length,
            kind: SegmentKind::Noise,
        }
    }
}

/// Versioned configuration governing layer count, obfuscation pattern and
/// noise charset for a validity window.
///
/// Two recipes with the same `version` must be identical; the manager's
/// cache relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub version: u16,
    pub segment_pattern: Vec<Segment>,
    /// ASCII characters noise bytes are drawn from.
    pub charset: String,
    pub randomize_noise: bool,
    #[serde(default)]
    pub noise_variance: u8,
    pub layer_count: u8,
    /// Unix seconds, inclusive.
    #[serde(default)]
    pub valid_from: u64,
    /// Unix seconds, exclusive.
    #[serde(default = "default_valid_to")]
    pub valid_to: u64,
}

fn default_valid_to() -> u64 {
    u64::MAX
}

impl Recipe {
    /// Check the structural invariants every recipe must satisfy.
    pub fn validate(&self) -> Result<(), TokenError> {
        if !(MIN_LAYERS..=MAX_LAYERS).contains(&self.layer_count) {
            return Err(TokenError::invalid_config(format!(
                "layer_count {} outside [{}, {}]",
                self.layer_count, MIN_LAYERS, MAX_LAYERS
            )));
        }

        if self.segment_pattern.is_empty() || self.segment_pattern.len() > MAX_SEGMENTS {
            return Err(TokenError::invalid_config(format!(
                "segment_pattern must hold 1..={} segments",
                MAX_SEGMENTS
            )));
        }

        if self.segment_pattern.iter().any(|s| s.length == 0) {
            return Err(TokenError::invalid_config(
                "segment lengths must be positive",
            ));
        }

        if !self
            .segment_pattern
            .iter()
            .any(|s| s.kind == SegmentKind::Core)
        {
            return Err(TokenError::invalid_config(
                "segment_pattern needs at least one core segment",
            ));
        }

        if self.charset.is_empty() || !self.charset.is_ascii() {
            return Err(TokenError::invalid_config(
                "charset must be non-empty ASCII",
            ));
        }

        if self.noise_variance > MAX_NOISE_VARIANCE {
            return Err(TokenError::invalid_config(format!(
                "noise_variance {} exceeds {}",
                self.noise_variance, MAX_NOISE_VARIANCE
            )));
        }

        if self.valid_from >= self.valid_to {
            return Err(TokenError::invalid_config(
                "valid_from must precede valid_to",
            ));
        }

        Ok(())
    }

    /// Whether `now` falls inside the validity window.
    pub fn is_active_at(&self, now: u64) -> bool {
        self.valid_from <= now && now < self.valid_to
    }

    pub fn charset_bytes(&self) -> &[u8] {
        self.charset.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Recipe {
        Recipe {
            version: 7,
            segment_pattern: vec![Segment::noise(4), Segment::core(12)],
            charset: "abcdef0123456789".to_string(),
            randomize_noise: false,
            noise_variance: 0,
            layer_count: 2,
            valid_from: 0,
            valid_to: u64::MAX,
        }
    }

    #[test]
    fn test_valid_recipe() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_layer_count_out_of_range() {
        for layers in [0, 4] {
            let mut recipe = sample();
            recipe.layer_count = layers;
            assert!(matches!(
                recipe.validate(),
                Err(TokenError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn test_pattern_without_core_rejected() {
        let mut recipe = sample();
        recipe.segment_pattern = vec![Segment::noise(3)];
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_zero_length_segment_rejected() {
        let mut recipe = sample();
        recipe.segment_pattern.push(Segment::core(0));
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_non_ascii_charset_rejected() {
        let mut recipe = sample();
        recipe.charset = "äö".to_string();
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_window() {
        let mut recipe = sample();
        recipe.valid_from = 100;
        recipe.valid_to = 200;
        assert!(!recipe.is_active_at(99));
        assert!(recipe.is_active_at(100));
        assert!(!recipe.is_active_at(200));
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let json = r#"{"version":1,"segment_pattern":[{"length":4,"kind":"core"}],
            "charset":"ab","randomize_noise":false,"layer_count":1,"extra":true}"#;
        assert!(serde_json::from_str::<Recipe>(json).is_err());
    }

    #[test]
    fn test_deserialize_defaults_window() {
        let json = r#"{"version":1,"segment_pattern":[{"length":4,"kind":"core"}],
            "charset":"ab","randomize_noise":false,"layer_count":1}"#;
        let recipe: Recipe = serde_json::from_str(json).unwrap();
        assert_eq!(recipe.valid_from, 0);
        assert_eq!(recipe.valid_to, u64::MAX);
        assert!(recipe.validate().is_ok());
    }
}
